//! Commission rate editor: fetch the shop's rate, edit it locally, push it
//! back and display whatever the server confirms.

use tracing::{info, warn};

use crate::{
    api::{CommissionUpdate, CommissionUpdated, ShopApi},
    error::{ConsoleError, Result},
    game::parse_rate,
    session::Session,
};

/// What the editor currently knows about the shop's rate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CommissionState {
    /// Nothing fetched yet.
    #[default]
    NotLoaded,
    /// No shop identity, or the server has no rate on record.
    NotFound,
    /// Last rate the server reported or confirmed.
    Loaded(f64),
}

impl CommissionState {
    /// The loaded rate, if any.
    pub fn rate(self) -> Option<f64> {
        match self {
            CommissionState::Loaded(rate) => Some(rate),
            _ => None,
        }
    }
}

/// Fetch the current rate for `shop_id`. An absent shop resolves to
/// [`CommissionState::NotFound`] without touching the network.
pub async fn load_commission<A: ShopApi>(
    api: &A,
    shop_id: Option<&str>,
) -> Result<CommissionState> {
    let Some(shop_id) = shop_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok(CommissionState::NotFound);
    };
    let profile = api.shop_profile(shop_id).await?;
    Ok(match profile.commission_rate {
        Some(rate) => CommissionState::Loaded(rate),
        None => CommissionState::NotFound,
    })
}

/// Push `rate` for `shop_id`, authenticated with `token` when present.
pub async fn update_commission<A: ShopApi>(
    api: &A,
    shop_id: Option<&str>,
    token: Option<&str>,
    rate: f64,
) -> Result<CommissionUpdated> {
    let shop_id = shop_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ConsoleError::MissingShop)?;
    let confirmed = api
        .update_commission(shop_id, token, CommissionUpdate { commission_rate: rate })
        .await?;
    info!(
        shop_id,
        requested = rate,
        confirmed = confirmed.new_commission_rate,
        "Commission updated"
    );
    Ok(confirmed)
}

/// Push `rate` on behalf of the signed-in operator. Requires a shop and a
/// bearer token.
pub async fn update_for_session<A: ShopApi>(
    api: &A,
    session: Option<&Session>,
    rate: f64,
) -> Result<CommissionUpdated> {
    let session = session
        .filter(|session| session.has_shop())
        .ok_or(ConsoleError::MissingShop)?;
    let Some(token) = session.token.as_deref() else {
        warn!(shop_id = %session.shop_id, "Commission update attempted without a token");
        return Err(ConsoleError::Auth(
            "session has no token; please log in again".to_string(),
        ));
    };
    update_commission(api, Some(&session.shop_id), Some(token), rate).await
}

/// Confirmation shown after a successful update.
pub fn confirmation_message(update: &CommissionUpdated) -> String {
    format!(
        "Commission for shop {} updated to {}",
        update.shop_id, update.new_commission_rate
    )
}

/// Screen state for the "Set Profit Margin" view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommissionEditor {
    state: CommissionState,
    input: String,
    message: Option<String>,
}

impl CommissionEditor {
    /// Fresh editor with nothing loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rate state.
    pub fn state(&self) -> CommissionState {
        self.state
    }

    /// Text in the rate field.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Replace the rate field.
    pub fn set_input(&mut self, value: impl Into<String>) {
        self.input = value.into();
    }

    /// Last confirmation message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Install a freshly loaded state; the input follows a loaded rate.
    pub fn apply_loaded(&mut self, state: CommissionState) {
        self.state = state;
        if let CommissionState::Loaded(rate) = state {
            self.input = rate.to_string();
        }
    }

    /// Parse the rate field.
    pub fn prepare_update(&self) -> Result<f64> {
        Ok(parse_rate(&self.input)?)
    }

    /// Install a server confirmation.
    pub fn apply_update(&mut self, update: &CommissionUpdated) {
        self.state = CommissionState::Loaded(update.new_commission_rate);
        self.input = update.new_commission_rate.to_string();
        self.message = Some(confirmation_message(update));
    }
}
