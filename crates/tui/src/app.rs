use std::{future::Future, io, sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use bingoshop_core::{
    api::{CommissionUpdated, ShopApi, ShopProfile},
    commission::{self, CommissionEditor, CommissionState},
    config::GameDefaults,
    error::{ConsoleError, Result as ShopResult},
    game::{self, GameConfig, GameStarted, MAX_CARD},
    report::{self, shop_today, ReportAggregator, ReportView},
    session::{Session, SessionStore},
};
use chrono::{FixedOffset, NaiveDate};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
    Frame, Terminal,
};
use tokio::{spawn, sync::mpsc};
use tracing::{debug, error, info, warn};

use crate::input::TextInput;

const TICK_RATE: Duration = Duration::from_millis(250);
const GRID_COLUMNS: u32 = 10;
const MENU_ITEMS: [&str; 4] = [
    "Select Cards for Game",
    "Daily Report",
    "Set Profit Margin",
    "Logout",
];

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    danger: Color,
    on_accent: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            danger: Color::Red,
            on_accent: Color::Black,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Login,
    Dashboard,
    GameSelect,
    Report,
    Commission,
}

impl Screen {
    fn title(self) -> &'static str {
        match self {
            Screen::Login => "Sign In",
            Screen::Dashboard => "Dashboard",
            Screen::GameSelect => "Select Cards for Game",
            Screen::Report => "Daily Report",
            Screen::Commission => "Set Profit Margin",
        }
    }

    fn requires_shop(self) -> bool {
        self != Screen::Login
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginField {
    ShopId,
    Username,
    Password,
}

impl LoginField {
    fn next(self) -> Self {
        match self {
            LoginField::ShopId => LoginField::Username,
            LoginField::Username => LoginField::Password,
            LoginField::Password => LoginField::ShopId,
        }
    }

    fn previous(self) -> Self {
        match self {
            LoginField::ShopId => LoginField::Password,
            LoginField::Username => LoginField::ShopId,
            LoginField::Password => LoginField::Username,
        }
    }
}

#[derive(Debug, Clone)]
struct LoginForm {
    shop_id: TextInput,
    username: TextInput,
    password: TextInput,
    focus: LoginField,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self {
            shop_id: TextInput::default(),
            username: TextInput::default(),
            password: TextInput::masked(),
            focus: LoginField::ShopId,
        }
    }
}

impl LoginForm {
    fn field(&self, field: LoginField) -> &TextInput {
        match field {
            LoginField::ShopId => &self.shop_id,
            LoginField::Username => &self.username,
            LoginField::Password => &self.password,
        }
    }

    fn focused_mut(&mut self) -> &mut TextInput {
        match self.focus {
            LoginField::ShopId => &mut self.shop_id,
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    Bet,
    Interval,
    Language,
    Card,
    ReportFrom,
    ReportTo,
    CommissionRate,
}

impl PromptKind {
    fn title(self) -> &'static str {
        match self {
            PromptKind::Bet => "Bet per Card",
            PromptKind::Interval => "Draw Interval",
            PromptKind::Language => "Caller Language",
            PromptKind::Card => "Toggle Card",
            PromptKind::ReportFrom => "From Date",
            PromptKind::ReportTo => "To Date",
            PromptKind::CommissionRate => "Commission Rate",
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            PromptKind::Bet => "Stake per selected card",
            PromptKind::Interval => "Seconds between calls, e.g. 4 or \"4 sec\"",
            PromptKind::Language => "Language of the number caller",
            PromptKind::Card => "Card number between 1 and 200",
            PromptKind::ReportFrom | PromptKind::ReportTo => "Date as YYYY-MM-DD",
            PromptKind::CommissionRate => "Fraction between 0 and 1, e.g. 0.2",
        }
    }
}

#[derive(Debug, Clone)]
struct Prompt {
    kind: PromptKind,
    input: TextInput,
}

enum AppEvent {
    Input(Event),
    Tick,
    LoggedIn(ShopResult<Session>),
    ProfileLoaded {
        visit: u64,
        result: ShopResult<ShopProfile>,
    },
    GameStarted {
        visit: u64,
        result: ShopResult<GameStarted>,
    },
    ReportLoaded {
        visit: u64,
        result: ShopResult<ReportView>,
    },
    CommissionLoaded {
        visit: u64,
        result: ShopResult<CommissionState>,
    },
    CommissionUpdated {
        visit: u64,
        result: ShopResult<CommissionUpdated>,
    },
}

/// Terminal front end for the shop console.
pub struct BingoShopApp<A> {
    api: Arc<A>,
    store: SessionStore,
    offset: FixedOffset,
    defaults: GameDefaults,
    screen: Screen,
    // Bumped on every navigation; async results tagged with an older value
    // belong to a screen the operator already left.
    visit: u64,
    state: UiState,
    theme: Theme,
    login: LoginForm,
    pending_login: bool,
    profile: Option<ShopProfile>,
    game: GameConfig,
    grid_cursor: u32,
    pending_start: bool,
    report: ReportAggregator,
    pending_report: bool,
    commission: CommissionEditor,
    // Visit that owns the in-flight commission request; a fresh visit issues
    // its own load.
    pending_commission: Option<u64>,
    prompt: Option<Prompt>,
    event_tx: Option<mpsc::Sender<AppEvent>>,
}

impl<A: ShopApi + 'static> BingoShopApp<A> {
    pub fn new(api: A, store: SessionStore, offset: FixedOffset, defaults: GameDefaults) -> Self {
        let today = shop_today(offset);
        let screen = if store.require_shop().is_ok() {
            Screen::Dashboard
        } else {
            Screen::Login
        };
        Self {
            api: Arc::new(api),
            store,
            offset,
            game: GameConfig::new(&defaults),
            defaults,
            screen,
            visit: 0,
            state: UiState::default(),
            theme: Theme::default(),
            login: LoginForm::default(),
            pending_login: false,
            profile: None,
            grid_cursor: 1,
            pending_start: false,
            report: ReportAggregator::new(today),
            pending_report: false,
            commission: CommissionEditor::new(),
            pending_commission: None,
            prompt: None,
            event_tx: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);

        if let Some(session) = self.store.current() {
            self.state
                .set_status(format!("Welcome back, {}", session.display_name));
        }
        self.navigate(self.screen);

        let result = self.event_loop(&mut terminal, event_rx).await;
        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        mut event_rx: mpsc::Receiver<AppEvent>,
    ) -> Result<()> {
        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.state.should_quit {
                break;
            }
            let maybe_event = event_rx.recv().await;
            if !self.process_app_event(maybe_event) || self.state.should_quit {
                break;
            }
        }
        Ok(())
    }

    fn today(&self) -> NaiveDate {
        shop_today(self.offset)
    }

    /// Switch screens, sending the operator back to the login form when no
    /// shop is signed in.
    fn navigate(&mut self, requested: Screen) {
        let screen = if requested.requires_shop() && self.store.require_shop().is_err() {
            warn!(requested = ?requested, "No shop in session; redirecting to login");
            Screen::Login
        } else {
            requested
        };

        self.visit += 1;
        self.screen = screen;
        self.prompt = None;
        debug!(screen = ?screen, visit = self.visit, "Screen changed");

        match screen {
            Screen::Login => {}
            Screen::Dashboard => self.request_profile(),
            Screen::GameSelect => {
                self.game = GameConfig::new(&self.defaults);
                if let Some(profile) = self.profile {
                    self.game.apply_profile(&profile);
                }
                self.grid_cursor = 1;
                self.request_profile();
            }
            Screen::Report => {
                self.report = ReportAggregator::new(self.today());
            }
            Screen::Commission => {
                self.commission = CommissionEditor::new();
                self.request_commission();
            }
        }
    }

    fn spawn_task<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = AppEvent> + Send + 'static,
    {
        let Some(sender) = self.event_tx.clone() else {
            self.state
                .set_error("Internal error: event channel unavailable");
            error!("event_channel_missing");
            return false;
        };
        spawn(async move {
            let event = task.await;
            let _ = sender.send(event).await;
        });
        true
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(event)) => {
                self.handle_input(event);
                true
            }
            Some(AppEvent::Tick) => true,
            Some(AppEvent::LoggedIn(result)) => {
                self.pending_login = false;
                self.finish_login(result);
                true
            }
            Some(AppEvent::ProfileLoaded { visit, result }) => {
                if self.is_current(visit, "profile") {
                    self.finish_profile(result);
                }
                true
            }
            Some(AppEvent::GameStarted { visit, result }) => {
                self.pending_start = false;
                if self.is_current(visit, "game start") {
                    self.finish_game_start(result);
                }
                true
            }
            Some(AppEvent::ReportLoaded { visit, result }) => {
                self.pending_report = false;
                if self.is_current(visit, "report") {
                    self.finish_report(result);
                }
                true
            }
            Some(AppEvent::CommissionLoaded { visit, result }) => {
                self.finish_pending_commission(visit);
                if self.is_current(visit, "commission load") {
                    self.finish_commission_load(result);
                }
                true
            }
            Some(AppEvent::CommissionUpdated { visit, result }) => {
                self.finish_pending_commission(visit);
                if self.is_current(visit, "commission update") {
                    self.finish_commission_update(result);
                }
                true
            }
            None => false,
        }
    }

    fn is_current(&self, visit: u64, what: &str) -> bool {
        if visit == self.visit {
            return true;
        }
        debug!(what, visit, current = self.visit, "Discarding result for a screen already left");
        false
    }

    fn handle_input(&mut self, event: Event) {
        let Event::Key(key) = event else {
            return;
        };
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
            self.state.should_quit = true;
            return;
        }
        if self.prompt.is_some() {
            self.handle_prompt_key(key);
            return;
        }
        match self.screen {
            Screen::Login => self.handle_login_key(key),
            Screen::Dashboard => self.handle_dashboard_key(key),
            Screen::GameSelect => self.handle_game_key(key),
            Screen::Report => self.handle_report_key(key),
            Screen::Commission => self.handle_commission_key(key),
        }
    }

    fn open_prompt(&mut self, kind: PromptKind, initial: impl Into<String>) {
        self.prompt = Some(Prompt {
            kind,
            input: TextInput::new(initial),
        });
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.prompt = None;
                self.state.set_status("Cancelled");
            }
            KeyCode::Enter => {
                if let Some(prompt) = self.prompt.take() {
                    let value = prompt.input.value().trim().to_string();
                    match self.apply_prompt(prompt.kind, &value) {
                        Ok(Some(message)) => self.state.set_status(message),
                        Ok(None) => {}
                        Err(err) => self.state.set_error(err.user_message()),
                    }
                }
            }
            _ => {
                prompt.input.handle_key(&key);
            }
        }
    }

    fn apply_prompt(&mut self, kind: PromptKind, value: &str) -> ShopResult<Option<String>> {
        match kind {
            PromptKind::Bet => {
                let bet = game::parse_bet(value)?;
                self.game.set_bet(bet)?;
                Ok(Some(format!("Bet per card set to {}", format_money(bet))))
            }
            PromptKind::Interval => {
                let seconds = game::parse_interval(value)?;
                self.game.set_interval(seconds)?;
                Ok(Some(format!("Draw interval set to {seconds} sec")))
            }
            PromptKind::Language => {
                self.game.set_language(value)?;
                Ok(Some(format!("Language set to {}", self.game.language())))
            }
            PromptKind::Card => {
                let card = game::parse_card(value)?;
                self.grid_cursor = card;
                Ok(self.toggle_card(card))
            }
            PromptKind::ReportFrom => {
                self.use_custom_period();
                self.report.set_from_input(value);
                Ok(None)
            }
            PromptKind::ReportTo => {
                self.use_custom_period();
                self.report.set_to_input(value);
                Ok(None)
            }
            PromptKind::CommissionRate => {
                self.commission.set_input(value);
                self.submit_commission();
                Ok(None)
            }
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.state.should_quit = true,
            KeyCode::Tab | KeyCode::Down => self.login.focus = self.login.focus.next(),
            KeyCode::BackTab | KeyCode::Up => self.login.focus = self.login.focus.previous(),
            KeyCode::Enter => {
                if self.login.focus == LoginField::Password {
                    self.submit_login();
                } else {
                    self.login.focus = self.login.focus.next();
                }
            }
            _ => {
                self.login.focused_mut().handle_key(&key);
            }
        }
    }

    fn submit_login(&mut self) {
        if self.pending_login {
            self.state.set_status("Login already in progress");
            return;
        }
        let store = self.store.clone();
        let api = Arc::clone(&self.api);
        let shop_id = self.login.shop_id.value().to_string();
        let username = self.login.username.value().to_string();
        let password = self.login.password.value().to_string();
        info!(shop_id = %shop_id.trim(), "Signing in");
        self.pending_login = self.spawn_task(async move {
            let result = store.login(&*api, &shop_id, &username, &password).await;
            AppEvent::LoggedIn(result)
        });
        if self.pending_login {
            self.state.set_status("Signing in…");
        }
    }

    fn finish_login(&mut self, result: ShopResult<Session>) {
        match result {
            Ok(session) => {
                self.login.password.clear();
                self.profile = None;
                self.state
                    .set_status(format!("Welcome, {}", session.display_name));
                self.navigate(Screen::Dashboard);
            }
            Err(err) => {
                warn!(error = %err, "Login failed");
                self.state.set_error(err.user_message());
            }
        }
    }

    fn logout(&mut self) {
        self.store.logout();
        self.profile = None;
        self.login = LoginForm::default();
        self.navigate(Screen::Login);
        self.state.set_status("Logged out");
    }

    fn request_profile(&mut self) {
        let Ok(shop_id) = self.store.require_shop() else {
            return;
        };
        let api = Arc::clone(&self.api);
        let visit = self.visit;
        self.spawn_task(async move {
            let result = api.shop_profile(&shop_id).await;
            AppEvent::ProfileLoaded { visit, result }
        });
    }

    fn finish_profile(&mut self, result: ShopResult<ShopProfile>) {
        match result {
            Ok(profile) => {
                self.profile = Some(profile);
                if self.screen == Screen::GameSelect {
                    self.game.apply_profile(&profile);
                }
            }
            Err(err) => {
                self.state
                    .set_error(format!("Could not load shop profile: {}", err.user_message()));
            }
        }
    }

    fn handle_dashboard_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.state.should_quit = true;
            }
            KeyCode::Char('j') | KeyCode::Down => self.state.move_menu_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.state.move_menu_cursor(-1),
            KeyCode::Char('r') => {
                self.request_profile();
                self.state.set_status("Refreshing shop profile…");
            }
            KeyCode::Char(ch @ '1'..='4') => {
                self.state.menu_cursor = (ch as usize) - ('1' as usize);
                self.activate_menu_item();
            }
            KeyCode::Enter => self.activate_menu_item(),
            _ => {}
        }
    }

    fn activate_menu_item(&mut self) {
        match self.state.menu_cursor {
            0 => {
                self.navigate(Screen::GameSelect);
                self.state.set_status("Select cards, then press s to start");
            }
            1 => {
                self.navigate(Screen::Report);
                self.state.set_status("Choose a period and press Enter");
            }
            2 => self.navigate(Screen::Commission),
            3 => self.logout(),
            _ => {}
        }
    }

    fn handle_game_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.navigate(Screen::Dashboard),
            KeyCode::Left | KeyCode::Char('h') => self.move_grid_cursor(-1),
            KeyCode::Right | KeyCode::Char('l') => self.move_grid_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_grid_cursor(-(GRID_COLUMNS as i64)),
            KeyCode::Down | KeyCode::Char('j') => self.move_grid_cursor(GRID_COLUMNS as i64),
            KeyCode::Char(' ') => {
                if let Some(message) = self.toggle_card(self.grid_cursor) {
                    self.state.set_status(message);
                }
            }
            KeyCode::Char('c') => {
                self.game.clear_selection();
                self.state.set_status("Selection cleared");
            }
            KeyCode::Char('p') => {
                let pattern = self.game.pattern().next();
                self.game.set_pattern(pattern);
                self.state.set_status(format!("Winning pattern: {pattern}"));
            }
            KeyCode::Char('P') => {
                let pattern = self.game.pattern().previous();
                self.game.set_pattern(pattern);
                self.state.set_status(format!("Winning pattern: {pattern}"));
            }
            KeyCode::Char('b') => {
                let current = self.game.bet_per_card().to_string();
                self.open_prompt(PromptKind::Bet, current);
            }
            KeyCode::Char('i') => {
                let current = self.game.interval_seconds().to_string();
                self.open_prompt(PromptKind::Interval, current);
            }
            KeyCode::Char('L') => {
                let current = self.game.language().to_string();
                self.open_prompt(PromptKind::Language, current);
            }
            KeyCode::Char('g') | KeyCode::Char('/') => self.open_prompt(PromptKind::Card, ""),
            KeyCode::Enter | KeyCode::Char('s') => self.start_game(),
            _ => {}
        }
    }

    fn move_grid_cursor(&mut self, delta: i64) {
        let next = i64::from(self.grid_cursor) + delta;
        self.grid_cursor = next.clamp(1, i64::from(MAX_CARD)) as u32;
    }

    fn toggle_card(&mut self, card: u32) -> Option<String> {
        let selected = self.game.toggle_card(card)?;
        let verb = if selected { "selected" } else { "removed" };
        Some(format!(
            "Card {card} {verb} ({} in play)",
            self.game.card_count()
        ))
    }

    fn start_game(&mut self) {
        if self.pending_start {
            self.state.set_status("A game is already starting");
            return;
        }
        let config = self.game.clone();
        let shop_id = self.store.require_shop().ok();
        let api = Arc::clone(&self.api);
        let visit = self.visit;
        self.pending_start = self.spawn_task(async move {
            let result = config.start_game(&*api, shop_id.as_deref()).await;
            AppEvent::GameStarted { visit, result }
        });
        if self.pending_start {
            self.state.set_status("Starting game…");
        }
    }

    fn finish_game_start(&mut self, result: ShopResult<GameStarted>) {
        match result {
            Ok(started) => {
                self.game.clear_selection();
                self.state.set_status(format!(
                    "Game started with {} cards, prize {}",
                    started.total_cards,
                    format_money(started.prize)
                ));
            }
            Err(err) => self.state.set_error(err.user_message()),
        }
    }

    fn handle_report_key(&mut self, key: KeyEvent) {
        let today = self.today();
        match key.code {
            KeyCode::Esc => self.navigate(Screen::Dashboard),
            KeyCode::Right | KeyCode::Char(']') | KeyCode::Char('l') => {
                let period = self.report.period().next();
                self.report.select_period(period, today);
            }
            KeyCode::Left | KeyCode::Char('[') | KeyCode::Char('h') => {
                let period = self.report.period().previous();
                self.report.select_period(period, today);
            }
            KeyCode::Char('f') => {
                let current = self.report.from_input().to_string();
                self.open_prompt(PromptKind::ReportFrom, current);
            }
            KeyCode::Char('t') => {
                let current = self.report.to_input().to_string();
                self.open_prompt(PromptKind::ReportTo, current);
            }
            KeyCode::Enter | KeyCode::Char('r') => self.submit_report(),
            _ => {}
        }
    }

    fn use_custom_period(&mut self) {
        if self.report.period() != report::ReportPeriod::Custom {
            let today = self.today();
            self.report
                .select_period(report::ReportPeriod::Custom, today);
        }
    }

    fn submit_report(&mut self) {
        if self.pending_report {
            self.state.set_status("Report is already loading");
            return;
        }
        let range = match self.report.range() {
            Ok(range) => range,
            Err(err) => {
                if let Err(err) = self.report.apply(Err(err)) {
                    self.state.set_error(err.user_message());
                }
                return;
            }
        };
        let shop_id = self.store.require_shop().ok();
        let api = Arc::clone(&self.api);
        let visit = self.visit;
        self.pending_report = self.spawn_task(async move {
            let result = report::fetch_report(&*api, shop_id.as_deref(), range).await;
            AppEvent::ReportLoaded { visit, result }
        });
        if self.pending_report {
            self.state.set_status(format!("Loading report for {range}…"));
        }
    }

    fn finish_report(&mut self, result: ShopResult<ReportView>) {
        match self.report.apply(result) {
            Ok(()) => {
                let rows = self.report.view().rows().len();
                self.state.set_status(format!("Loaded {rows} report rows"));
            }
            Err(err) => self.state.set_error(err.user_message()),
        }
    }

    fn handle_commission_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.navigate(Screen::Dashboard),
            KeyCode::Enter | KeyCode::Char('e') => {
                let current = self.commission.input().to_string();
                self.open_prompt(PromptKind::CommissionRate, current);
            }
            KeyCode::Char('r') => self.request_commission(),
            _ => {}
        }
    }

    fn commission_busy(&self) -> bool {
        self.pending_commission == Some(self.visit)
    }

    fn finish_pending_commission(&mut self, visit: u64) {
        if self.pending_commission == Some(visit) {
            self.pending_commission = None;
        }
    }

    fn request_commission(&mut self) {
        if self.commission_busy() {
            return;
        }
        let shop_id = self.store.require_shop().ok();
        let api = Arc::clone(&self.api);
        let visit = self.visit;
        if self.spawn_task(async move {
            let result = commission::load_commission(&*api, shop_id.as_deref()).await;
            AppEvent::CommissionLoaded { visit, result }
        }) {
            self.pending_commission = Some(visit);
        }
    }

    fn finish_commission_load(&mut self, result: ShopResult<CommissionState>) {
        match result {
            Ok(state) => {
                self.commission.apply_loaded(state);
                if state == CommissionState::NotFound {
                    self.state.set_status("No commission rate on record");
                }
            }
            Err(err) => self.state.set_error(err.user_message()),
        }
    }

    fn submit_commission(&mut self) {
        if self.commission_busy() {
            self.state.set_status("Commission request already in progress");
            return;
        }
        let rate = match self.commission.prepare_update() {
            Ok(rate) => rate,
            Err(err) => {
                self.state.set_error(err.user_message());
                return;
            }
        };
        let session = self.store.current();
        let api = Arc::clone(&self.api);
        let visit = self.visit;
        if self.spawn_task(async move {
            let result = commission::update_for_session(&*api, session.as_ref(), rate).await;
            AppEvent::CommissionUpdated { visit, result }
        }) {
            self.pending_commission = Some(visit);
            self.state.set_status("Updating commission…");
        }
    }

    fn finish_commission_update(&mut self, result: ShopResult<CommissionUpdated>) {
        match result {
            Ok(update) => {
                self.commission.apply_update(&update);
                if let Some(message) = self.commission.message() {
                    self.state.set_status(message.to_string());
                }
            }
            Err(err) => self.state.set_error(err.user_message()),
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(1),
            ])
            .split(frame.size());

        self.render_header(frame, layout[0]);
        match self.screen {
            Screen::Login => self.render_login(frame, layout[1]),
            Screen::Dashboard => self.render_dashboard(frame, layout[1]),
            Screen::GameSelect => self.render_game(frame, layout[1]),
            Screen::Report => self.render_report(frame, layout[1]),
            Screen::Commission => self.render_commission(frame, layout[1]),
        }
        self.render_status(frame, layout[2]);
        if let Some(prompt) = &self.prompt {
            self.render_prompt(frame, prompt);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::styled(
            "Bingo Shop Console",
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD),
        )];
        if let Some(session) = self.store.current() {
            spans.push(Span::raw(format!(
                "  |  Shop {}  |  {}",
                session.shop_id, session.display_name
            )));
        }
        let paragraph = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .title(self.screen.title()),
        );
        frame.render_widget(paragraph, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let color = if self.state.status_is_error {
            self.theme.danger
        } else {
            self.theme.muted
        };
        let paragraph =
            Paragraph::new(self.state.status.as_str()).style(Style::default().fg(color));
        frame.render_widget(paragraph, area);
    }

    fn render_login(&self, frame: &mut Frame, area: Rect) {
        let form_area = centered_rect(50, 11, area);
        frame.render_widget(Clear, form_area);

        let fields = [
            (LoginField::ShopId, "Shop ID "),
            (LoginField::Username, "Username"),
            (LoginField::Password, "Password"),
        ];
        let mut lines = Vec::new();
        for (field, label) in fields {
            let focused = field == self.login.focus;
            let marker = if focused { "▶ " } else { "  " };
            let label_style = if focused {
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.theme.primary_fg)
            };
            lines.push(Line::from(vec![
                Span::styled(format!("{marker}{label}: "), label_style),
                Span::raw(self.login.field(field).display()),
            ]));
            lines.push(Line::from(""));
        }
        lines.push(Line::from(vec![
            Span::styled("Tab", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" next field  "),
            Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" sign in  "),
            Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" quit"),
        ]));
        if self.pending_login {
            lines.push(Line::from(Span::styled(
                "Signing in…",
                Style::default().fg(self.theme.muted),
            )));
        }

        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Shop Login"))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, form_area);

        if self.prompt.is_none() {
            let row = match self.login.focus {
                LoginField::ShopId => 0,
                LoginField::Username => 2,
                LoginField::Password => 4,
            };
            let input = self.login.field(self.login.focus);
            // "▶ " + 8-char label + ": "
            let prefix = 2 + 8 + 2;
            let cursor_x = (form_area.x + 1 + prefix + input.cursor() as u16)
                .min(form_area.x + form_area.width.saturating_sub(2));
            frame.set_cursor(cursor_x, form_area.y + 1 + row);
        }
    }

    fn render_dashboard(&self, frame: &mut Frame, area: Rect) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(area);

        let session = self.store.current();
        let mut lines = vec![
            Line::from(format!(
                "Shop:       {}",
                session.as_ref().map_or("-", |s| s.shop_id.as_str())
            )),
            Line::from(format!(
                "Operator:   {}",
                session.as_ref().map_or("-", |s| s.display_name.as_str())
            )),
            Line::from(""),
        ];
        match self.profile {
            Some(profile) => {
                lines.push(Line::from(format!(
                    "Balance:    {}",
                    format_money(profile.balance)
                )));
                lines.push(Line::from(format!(
                    "Commission: {}",
                    profile
                        .commission_rate
                        .map_or_else(|| "not set".to_string(), format_rate)
                )));
            }
            None => lines.push(Line::from(Span::styled(
                "Loading shop profile…",
                Style::default().fg(self.theme.muted),
            ))),
        }
        let profile = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Shop"))
            .wrap(Wrap { trim: true });
        frame.render_widget(profile, columns[0]);

        let mut menu_lines: Vec<Line> = MENU_ITEMS
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                if idx == self.state.menu_cursor {
                    Line::from(Span::styled(
                        format!("▶ {} {item}", idx + 1),
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    ))
                } else {
                    Line::from(Span::styled(
                        format!("  {} {item}", idx + 1),
                        Style::default().fg(self.theme.primary_fg),
                    ))
                }
            })
            .collect();
        menu_lines.push(Line::from(""));
        menu_lines.push(Line::from("j/k   move    Enter open"));
        menu_lines.push(Line::from("r     refresh q     quit"));
        let menu = Paragraph::new(menu_lines)
            .block(Block::default().borders(Borders::ALL).title("Menu"));
        frame.render_widget(menu, columns[1]);
    }

    fn render_game(&self, frame: &mut Frame, area: Rect) {
        let grid_width = (GRID_COLUMNS as u16) * 5 + 2;
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(grid_width), Constraint::Min(30)])
            .split(area);

        let rows = MAX_CARD.div_ceil(GRID_COLUMNS);
        let grid_lines: Vec<Line> = (0..rows)
            .map(|row| {
                let spans: Vec<Span> = (1..=GRID_COLUMNS)
                    .map(|col| row * GRID_COLUMNS + col)
                    .filter(|card| *card <= MAX_CARD)
                    .map(|card| {
                        let mut style = if self.game.is_selected(card) {
                            Style::default()
                                .fg(self.theme.on_accent)
                                .bg(self.theme.success)
                                .add_modifier(Modifier::BOLD)
                        } else {
                            Style::default().fg(self.theme.primary_fg)
                        };
                        if card == self.grid_cursor {
                            style = style.add_modifier(Modifier::REVERSED);
                        }
                        Span::styled(format!("{card:>4} "), style)
                    })
                    .collect();
                Line::from(spans)
            })
            .collect();
        let grid = Paragraph::new(grid_lines)
            .block(Block::default().borders(Borders::ALL).title("Cards"));
        frame.render_widget(grid, columns[0]);

        let selected = self.game.selected_cards();
        let preview = if selected.is_empty() {
            "none".to_string()
        } else {
            selected
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let highlight = Style::default()
            .fg(self.theme.accent)
            .add_modifier(Modifier::BOLD);
        let mut lines = vec![
            Line::from(format!(
                "Bet per card:  {}",
                format_money(self.game.bet_per_card())
            )),
            Line::from(format!("Pattern:       {}", self.game.pattern())),
            Line::from(format!(
                "Interval:      {} sec",
                self.game.interval_seconds()
            )),
            Line::from(format!("Language:      {}", self.game.language())),
            Line::from(format!(
                "Commission:    {}",
                format_rate(self.game.commission_rate())
            )),
            Line::from(""),
            Line::from(format!("Cards in play: {}", self.game.card_count())),
            Line::from(vec![
                Span::raw("Prize:         "),
                Span::styled(format_money(self.game.projected_prize()), highlight),
            ]),
            Line::from(format!("Selected:      {preview}")),
            Line::from(""),
            Line::from("hjkl  move       Space toggle"),
            Line::from("g     toggle by number"),
            Line::from("c     clear      p/P   pattern"),
            Line::from("b     bet        i     interval"),
            Line::from("L     language   s     start game"),
            Line::from("Esc   back to dashboard"),
        ];
        if self.pending_start {
            lines.push(Line::from(Span::styled(
                "Starting game…",
                Style::default().fg(self.theme.muted),
            )));
        }
        let settings = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Game Setup"))
            .wrap(Wrap { trim: true });
        frame.render_widget(settings, columns[1]);
    }

    fn render_report(&self, frame: &mut Frame, area: Rect) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(6), Constraint::Min(4)])
            .split(area);

        let filters = Paragraph::new(vec![
            Line::from(vec![
                Span::raw("Period: "),
                Span::styled(
                    format!("< {} >", self.report.period()),
                    Style::default()
                        .fg(self.theme.accent)
                        .add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(format!("From:   {}", self.report.from_input())),
            Line::from(format!("To:     {}", self.report.to_input())),
            Line::from("←/→ period   f from   t to   Enter load   Esc back"),
        ])
        .block(Block::default().borders(Borders::ALL).title("Filter"));
        frame.render_widget(filters, layout[0]);

        let header = Row::new(vec![
            "Date",
            "Games",
            "Placed",
            "Awarded",
            "Net Cash",
            "Commission",
        ])
        .style(
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD),
        );
        let view = self.report.view();
        let mut rows: Vec<Row> = view
            .rows()
            .iter()
            .map(|row| {
                Row::new(vec![
                    Cell::from(row.date.format("%Y-%m-%d").to_string()),
                    Cell::from(row.play_count.to_string()),
                    Cell::from(format!("{:.2}", row.placed_bet)),
                    Cell::from(format!("{:.2}", row.awarded)),
                    Cell::from(format!("{:.2}", row.net_cash)),
                    Cell::from(format!("{:.2}", row.commission_amount)),
                ])
            })
            .collect();
        let totals = view.totals();
        rows.push(
            Row::new(vec![
                Cell::from("Total"),
                Cell::from(totals.play_count.to_string()),
                Cell::from(format!("{:.2}", totals.placed_bet)),
                Cell::from(format!("{:.2}", totals.awarded)),
                Cell::from(format!("{:.2}", totals.net_cash)),
                Cell::from(format!("{:.2}", totals.commission_amount)),
            ])
            .style(
                Style::default()
                    .bg(self.theme.selection_bg)
                    .add_modifier(Modifier::BOLD),
            ),
        );
        let title = if self.pending_report {
            "Report (loading…)"
        } else {
            "Report"
        };
        let table = Table::new(
            rows,
            [
                Constraint::Length(12),
                Constraint::Length(7),
                Constraint::Length(12),
                Constraint::Length(12),
                Constraint::Length(12),
                Constraint::Length(12),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(table, layout[1]);
    }

    fn render_commission(&self, frame: &mut Frame, area: Rect) {
        let box_area = centered_rect(56, 10, area);
        let current = match self.commission.state() {
            CommissionState::NotLoaded => "loading…".to_string(),
            CommissionState::NotFound => "not found".to_string(),
            CommissionState::Loaded(rate) => format_rate(rate),
        };
        let mut lines = vec![
            Line::from(format!("Current rate: {current}")),
            Line::from(format!("New rate:     {}", self.commission.input())),
            Line::from(""),
        ];
        if let Some(message) = self.commission.message() {
            lines.push(Line::from(Span::styled(
                message.to_string(),
                Style::default().fg(self.theme.success),
            )));
        }
        lines.push(Line::from(""));
        lines.push(Line::from("Enter edit & save   r reload   Esc back"));
        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Profit Margin"),
            )
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, box_area);
    }

    fn render_prompt(&self, frame: &mut Frame, prompt: &Prompt) {
        let area = centered_rect(52, 7, frame.size());
        frame.render_widget(Clear, area);

        let input_line = Line::from(vec![
            Span::styled("> ", Style::default().fg(self.theme.accent)),
            Span::raw(prompt.input.display()),
        ]);
        let helper = Line::from(vec![
            Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" confirm  "),
            Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" cancel"),
        ]);
        let paragraph = Paragraph::new(vec![
            Line::from(prompt.kind.instruction()),
            input_line,
            Line::from(""),
            helper,
        ])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(prompt.kind.title())
                .title_alignment(Alignment::Left),
        )
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);

        let cursor_x = (area.x + 3 + prompt.input.cursor() as u16)
            .min(area.x + area.width.saturating_sub(2));
        frame.set_cursor(cursor_x, area.y + 2);
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

struct UiState {
    status: String,
    status_is_error: bool,
    should_quit: bool,
    menu_cursor: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            status: "Ready".to_string(),
            status_is_error: false,
            should_quit: false,
            menu_cursor: 0,
        }
    }
}

impl UiState {
    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.status_is_error = false;
    }

    fn set_error(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.status_is_error = true;
    }

    fn move_menu_cursor(&mut self, delta: isize) {
        let last = MENU_ITEMS.len() as isize - 1;
        self.menu_cursor = (self.menu_cursor as isize + delta).clamp(0, last) as usize;
    }
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn format_money(value: f64) -> String {
    format!("{value:.2} Birr")
}

fn format_rate(rate: f64) -> String {
    format!("{rate} ({:.1}%)", rate * 100.0)
}
