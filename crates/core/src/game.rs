//! Game-configuration builder: card selection, stake, pattern and the
//! "start game" submission.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    api::{SaveGameRequest, ShopApi, ShopProfile},
    config::GameDefaults,
    error::{ConsoleError, Result, ValidationError},
};

/// Highest selectable card number.
pub const MAX_CARD: u32 = 200;
/// Commission assumed when the shop has no rate on record.
pub const FALLBACK_COMMISSION_RATE: f64 = 0.2;

/// Server-defined rule deciding what wins a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WinningPattern {
    /// Any winning arrangement.
    #[default]
    #[serde(rename = "All")]
    All,
    /// Any single complete line.
    #[serde(rename = "any 1 Line")]
    AnyOneLine,
    /// Any two complete lines.
    #[serde(rename = "any 2 Line")]
    AnyTwoLine,
    /// Every number on the card.
    #[serde(rename = "Full House")]
    FullHouse,
}

impl WinningPattern {
    /// All patterns in menu order.
    pub const ALL: [WinningPattern; 4] = [
        WinningPattern::All,
        WinningPattern::AnyOneLine,
        WinningPattern::AnyTwoLine,
        WinningPattern::FullHouse,
    ];

    /// Label used on the wire and on screen.
    pub fn label(self) -> &'static str {
        match self {
            WinningPattern::All => "All",
            WinningPattern::AnyOneLine => "any 1 Line",
            WinningPattern::AnyTwoLine => "any 2 Line",
            WinningPattern::FullHouse => "Full House",
        }
    }

    /// Following pattern, wrapping around.
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    /// Preceding pattern, wrapping around.
    pub fn previous(self) -> Self {
        let index = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Self::ALL[(index + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for WinningPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parse a stake entered by the operator.
pub fn parse_bet(input: &str) -> Result<f64, ValidationError> {
    let value = parse_number("bet", input)?;
    ensure_positive("bet", value)
}

/// Parse a draw interval in whole seconds; accepts `4` as well as `4 sec`.
pub fn parse_interval(input: &str) -> Result<u32, ValidationError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_suffix("sec")
        .or_else(|| trimmed.strip_suffix('s'))
        .unwrap_or(trimmed)
        .trim();
    let value: u32 = digits.parse().map_err(|_| ValidationError::NotANumber {
        field: "interval",
        input: input.to_string(),
    })?;
    if value == 0 {
        return Err(ValidationError::NotPositive {
            field: "interval",
            value: 0.0,
        });
    }
    Ok(value)
}

/// Parse a commission rate in `[0, 1]`.
pub fn parse_rate(input: &str) -> Result<f64, ValidationError> {
    let value = parse_number("commission rate", input)?;
    validate_rate(value)
}

/// Parse a card number in `1..=200`.
pub fn parse_card(input: &str) -> Result<u32, ValidationError> {
    let value: u32 = input
        .trim()
        .parse()
        .map_err(|_| ValidationError::NotANumber {
            field: "card",
            input: input.to_string(),
        })?;
    if !(1..=MAX_CARD).contains(&value) {
        return Err(ValidationError::CardOutOfRange(value));
    }
    Ok(value)
}

fn parse_number(field: &'static str, input: &str) -> Result<f64, ValidationError> {
    let value: f64 = input
        .trim()
        .parse()
        .map_err(|_| ValidationError::NotANumber {
            field,
            input: input.to_string(),
        })?;
    if !value.is_finite() {
        return Err(ValidationError::NotANumber {
            field,
            input: input.to_string(),
        });
    }
    Ok(value)
}

fn ensure_positive(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotANumber {
            field,
            input: value.to_string(),
        });
    }
    if value <= 0.0 {
        return Err(ValidationError::NotPositive { field, value });
    }
    Ok(value)
}

fn validate_rate(value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::RateOutOfRange(value));
    }
    Ok(value)
}

/// Outcome of a successful start.
#[derive(Debug, Clone, PartialEq)]
pub struct GameStarted {
    /// Shop the game was started for.
    pub shop_id: String,
    /// Number of cards in play.
    pub total_cards: usize,
    /// Prize submitted with the game.
    pub prize: f64,
}

/// In-memory game setup, built interactively and submitted once.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    bet_per_card: f64,
    selected: BTreeSet<u32>,
    pattern: WinningPattern,
    interval_seconds: u32,
    language: String,
    // `None` when the shop has no rate on record.
    commission_rate: Option<f64>,
}

impl GameConfig {
    /// Start from configured defaults with no cards selected and no commission.
    pub fn new(defaults: &GameDefaults) -> Self {
        let bet_per_card = ensure_positive("bet", defaults.bet_per_card).unwrap_or_else(|err| {
            warn!(%err, "Ignoring configured default bet");
            GameDefaults::default().bet_per_card
        });
        Self {
            bet_per_card,
            selected: BTreeSet::new(),
            pattern: defaults.pattern,
            interval_seconds: defaults.interval_seconds.max(1),
            language: defaults.language.clone(),
            commission_rate: Some(0.0),
        }
    }

    /// Flip membership of card `n`. Returns the new membership, or `None`
    /// when `n` is outside `1..=200` and nothing changed.
    pub fn toggle_card(&mut self, n: u32) -> Option<bool> {
        if !(1..=MAX_CARD).contains(&n) {
            return None;
        }
        if self.selected.remove(&n) {
            Some(false)
        } else {
            self.selected.insert(n);
            Some(true)
        }
    }

    /// Deselect every card.
    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Whether card `n` is selected.
    pub fn is_selected(&self, n: u32) -> bool {
        self.selected.contains(&n)
    }

    /// Selected cards in ascending order.
    pub fn selected_cards(&self) -> Vec<u32> {
        self.selected.iter().copied().collect()
    }

    /// Number of selected cards.
    pub fn card_count(&self) -> usize {
        self.selected.len()
    }

    /// Stake per card.
    pub fn bet_per_card(&self) -> f64 {
        self.bet_per_card
    }

    /// Set the stake; rejects non-finite and non-positive amounts.
    pub fn set_bet(&mut self, amount: f64) -> Result<()> {
        self.bet_per_card = ensure_positive("bet", amount)?;
        Ok(())
    }

    /// Current winning pattern.
    pub fn pattern(&self) -> WinningPattern {
        self.pattern
    }

    /// Choose the winning pattern.
    pub fn set_pattern(&mut self, pattern: WinningPattern) {
        self.pattern = pattern;
    }

    /// Draw interval in seconds.
    pub fn interval_seconds(&self) -> u32 {
        self.interval_seconds
    }

    /// Set the draw interval; zero is rejected.
    pub fn set_interval(&mut self, seconds: u32) -> Result<()> {
        if seconds == 0 {
            return Err(ValidationError::NotPositive {
                field: "interval",
                value: 0.0,
            }
            .into());
        }
        self.interval_seconds = seconds;
        Ok(())
    }

    /// Caller voice language.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Set the caller language; blank input is rejected.
    pub fn set_language(&mut self, language: &str) -> Result<()> {
        let trimmed = language.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "language" }.into());
        }
        self.language = trimmed.to_string();
        Ok(())
    }

    /// Commission rate used for the projected prize; 20% when the shop has
    /// none on record.
    pub fn commission_rate(&self) -> f64 {
        self.commission_rate.unwrap_or(FALLBACK_COMMISSION_RATE)
    }

    /// Rate as reported by the shop, submitted unchanged with the game.
    pub fn reported_commission_rate(&self) -> Option<f64> {
        self.commission_rate
    }

    /// Set the commission rate; must lie in `[0, 1]`.
    pub fn set_commission_rate(&mut self, rate: f64) -> Result<()> {
        self.commission_rate = Some(validate_rate(rate)?);
        Ok(())
    }

    /// Adopt the shop's commission rate, which may be unset.
    pub fn apply_profile(&mut self, profile: &ShopProfile) {
        match profile.commission_rate.map(validate_rate).transpose() {
            Ok(rate) => self.commission_rate = rate,
            Err(err) => warn!(%err, "Shop commission rate ignored"),
        }
    }

    /// `|cards| × bet × (1 − commission)`.
    pub fn projected_prize(&self) -> f64 {
        self.selected.len() as f64 * self.bet_per_card * (1.0 - self.commission_rate())
    }

    /// Build the `/savegame` body for `shop_id`.
    pub fn to_request(&self, shop_id: &str) -> SaveGameRequest {
        SaveGameRequest {
            shop_id: shop_id.to_string(),
            bet_per_card: self.bet_per_card,
            prize: self.projected_prize(),
            total_cards: self.selected.len(),
            selected_cards: self.selected_cards(),
            interval: u64::from(self.interval_seconds) * 1000,
            language: self.language.clone(),
            commission_rate: self.commission_rate,
            winning_pattern: self.pattern,
        }
    }

    /// Submit the configuration. An empty selection fails before any call.
    pub async fn start_game<A: ShopApi>(
        &self,
        api: &A,
        shop_id: Option<&str>,
    ) -> Result<GameStarted> {
        if self.selected.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        let shop_id = shop_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConsoleError::MissingShop)?;

        let request = self.to_request(shop_id);
        api.save_game(&request).await?;
        info!(
            shop_id,
            cards = request.total_cards,
            prize = request.prize,
            pattern = request.winning_pattern.label(),
            "Game started"
        );
        Ok(GameStarted {
            shop_id: shop_id.to_string(),
            total_cards: request.total_cards,
            prize: request.prize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{Call, ScriptedApi};

    fn config() -> GameConfig {
        GameConfig::new(&GameDefaults::default())
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn projected_prize_follows_formula() -> Result<()> {
        let mut game = config();
        for card in [1, 5, 9] {
            game.toggle_card(card);
        }
        game.set_bet(10.0)?;
        game.set_commission_rate(0.2)?;
        assert_close(game.projected_prize(), 24.0);

        game.toggle_card(9);
        assert_close(game.projected_prize(), 16.0);

        game.set_commission_rate(0.0)?;
        assert_close(game.projected_prize(), 20.0);
        Ok(())
    }

    #[test]
    fn projected_prize_does_not_mutate() {
        let mut game = config();
        game.toggle_card(3);
        let before = game.clone();
        let _ = game.projected_prize();
        assert_eq!(game, before);
    }

    #[test]
    fn toggle_twice_restores_selection() {
        let mut game = config();
        game.toggle_card(42);
        game.toggle_card(7);
        for n in 1..=MAX_CARD {
            let before = game.selected_cards();
            game.toggle_card(n);
            game.toggle_card(n);
            assert_eq!(game.selected_cards(), before, "card {n}");
        }
    }

    #[test]
    fn toggle_outside_range_is_ignored() {
        let mut game = config();
        assert_eq!(game.toggle_card(0), None);
        assert_eq!(game.toggle_card(201), None);
        assert_eq!(game.card_count(), 0);
        assert_eq!(game.toggle_card(200), Some(true));
        assert_eq!(game.toggle_card(200), Some(false));
    }

    #[test]
    fn boundary_parsers_reject_malformed_input() {
        assert_eq!(parse_bet(" 15 "), Ok(15.0));
        assert!(matches!(
            parse_bet("ten"),
            Err(ValidationError::NotANumber { .. })
        ));
        assert!(matches!(
            parse_bet("NaN"),
            Err(ValidationError::NotANumber { .. })
        ));
        assert!(matches!(
            parse_bet("0"),
            Err(ValidationError::NotPositive { .. })
        ));

        assert_eq!(parse_interval("4 sec"), Ok(4));
        assert_eq!(parse_interval("6"), Ok(6));
        assert!(parse_interval("0").is_err());
        assert!(parse_interval("fast").is_err());

        assert_eq!(parse_rate("0.15"), Ok(0.15));
        assert_eq!(parse_rate("1.5"), Err(ValidationError::RateOutOfRange(1.5)));

        assert_eq!(parse_card("200"), Ok(200));
        assert_eq!(parse_card("201"), Err(ValidationError::CardOutOfRange(201)));
    }

    #[test]
    fn rejected_setters_keep_previous_state() {
        let mut game = config();
        assert!(game.set_bet(-5.0).is_err());
        assert!(game.set_bet(f64::NAN).is_err());
        assert_eq!(game.bet_per_card(), 10.0);
        assert!(game.set_commission_rate(1.2).is_err());
        assert_eq!(game.commission_rate(), 0.0);
        assert!(game.set_interval(0).is_err());
        assert_eq!(game.interval_seconds(), 4);
        assert!(game.set_language("  ").is_err());
        assert_eq!(game.language(), "Amharic");
    }

    #[test]
    fn profile_rate_is_adopted_with_fallback() {
        let mut game = config();
        game.apply_profile(&ShopProfile {
            balance: 0.0,
            commission_rate: Some(0.25),
        });
        assert_eq!(game.commission_rate(), 0.25);
        game.apply_profile(&ShopProfile {
            balance: 0.0,
            commission_rate: None,
        });
        assert_eq!(game.commission_rate(), FALLBACK_COMMISSION_RATE);
        assert_eq!(game.reported_commission_rate(), None);
    }

    #[tokio::test]
    async fn unset_shop_rate_is_submitted_as_null() -> Result<()> {
        let api = ScriptedApi::default();
        api.saves.lock().push_back(Ok(()));

        let mut game = config();
        game.apply_profile(&ShopProfile {
            balance: 0.0,
            commission_rate: None,
        });
        game.toggle_card(3);
        game.set_bet(10.0)?;
        let started = game.start_game(&api, Some("lidu")).await?;
        assert_close(started.prize, 8.0);

        let calls = api.calls();
        let Some(Call::SaveGame(request)) = calls.first() else {
            panic!("expected save game call, got {calls:?}");
        };
        assert_eq!(request.commission_rate, None);
        assert_close(request.prize, 8.0);
        Ok(())
    }

    #[test]
    fn pattern_cycles_through_all_values() {
        let mut pattern = WinningPattern::All;
        for _ in 0..WinningPattern::ALL.len() {
            pattern = pattern.next();
        }
        assert_eq!(pattern, WinningPattern::All);
        assert_eq!(WinningPattern::All.previous(), WinningPattern::FullHouse);
    }

    #[tokio::test]
    async fn empty_selection_never_reaches_the_server() {
        let api = ScriptedApi::default();
        let game = config();
        let result = game.start_game(&api, Some("lidu")).await;
        assert!(matches!(
            result,
            Err(ConsoleError::Validation(ValidationError::EmptySelection))
        ));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_shop_never_reaches_the_server() {
        let api = ScriptedApi::default();
        let mut game = config();
        game.toggle_card(1);
        let result = game.start_game(&api, None).await;
        assert!(matches!(result, Err(ConsoleError::MissingShop)));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn start_game_submits_full_request() -> Result<()> {
        let api = ScriptedApi::default();
        api.saves.lock().push_back(Ok(()));

        let mut game = config();
        for card in [9, 1, 5] {
            game.toggle_card(card);
        }
        game.set_commission_rate(0.2)?;
        game.set_interval(5)?;
        game.set_pattern(WinningPattern::FullHouse);

        let started = game.start_game(&api, Some("lidu")).await?;
        assert_eq!(started.total_cards, 3);
        assert_close(started.prize, 24.0);

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        let Call::SaveGame(request) = &calls[0] else {
            panic!("expected save game call, got {:?}", calls[0]);
        };
        assert_eq!(request.shop_id, "lidu");
        assert_eq!(request.selected_cards, vec![1, 5, 9]);
        assert_eq!(request.interval, 5000);
        assert_eq!(request.language, "Amharic");
        assert_eq!(request.winning_pattern, WinningPattern::FullHouse);
        assert_eq!(request.commission_rate, Some(0.2));
        Ok(())
    }

    #[tokio::test]
    async fn server_rejection_is_a_game_start_error() {
        let api = ScriptedApi::default();
        api.saves
            .lock()
            .push_back(Err(ConsoleError::GameStart("server responded with 500".into())));
        let mut game = config();
        game.toggle_card(12);
        let result = game.start_game(&api, Some("lidu")).await;
        assert!(matches!(result, Err(ConsoleError::GameStart(_))));
    }
}
