use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{info, warn};

use crate::{
    api::{RawReportRow, ShopApi},
    error::{ConsoleError, Result},
};

use super::period::{parse_date_input, DateRange, ReportPeriod, DATE_INPUT_FORMAT};

/// One day of shop activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    /// Timestamp the server attached to the row; midnight for plain dates.
    pub date: NaiveDateTime,
    /// Games played.
    pub play_count: u64,
    /// Total stakes placed.
    pub placed_bet: f64,
    /// Total prizes paid out.
    pub awarded: f64,
    /// Placed minus awarded.
    pub net_cash: f64,
    /// Company commission taken.
    pub commission_amount: f64,
}

impl ReportRow {
    /// Convert a wire row, or `None` when its date cannot be read.
    pub fn from_raw(raw: &RawReportRow) -> Option<Self> {
        let date = parse_report_date(&raw.date)?;
        Some(Self {
            date,
            play_count: raw.play_count,
            placed_bet: raw.placed_bets,
            awarded: raw.awarded,
            net_cash: raw.net_cash,
            commission_amount: raw.company_commission,
        })
    }
}

fn parse_report_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(day.and_time(NaiveTime::MIN));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(at);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.naive_local())
}

/// Field-wise sums over a set of rows.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReportTotals {
    /// Sum of play counts.
    pub play_count: u64,
    /// Sum of placed stakes.
    pub placed_bet: f64,
    /// Sum of prizes paid out.
    pub awarded: f64,
    /// Sum of net cash.
    pub net_cash: f64,
    /// Sum of commission.
    pub commission_amount: f64,
}

impl ReportTotals {
    /// Totals of `rows`; all zero for an empty slice.
    pub fn sum(rows: &[ReportRow]) -> Self {
        rows.iter().fold(Self::default(), |mut acc, row| {
            acc.play_count += row.play_count;
            acc.placed_bet += row.placed_bet;
            acc.awarded += row.awarded;
            acc.net_cash += row.net_cash;
            acc.commission_amount += row.commission_amount;
            acc
        })
    }
}

/// Rows and totals currently on screen. Always consistent with each other.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportView {
    rows: Vec<ReportRow>,
    totals: ReportTotals,
}

impl ReportView {
    /// View over `rows` with freshly computed totals.
    pub fn from_rows(rows: Vec<ReportRow>) -> Self {
        let totals = ReportTotals::sum(&rows);
        Self { rows, totals }
    }

    /// Displayed rows.
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Totals of the displayed rows.
    pub fn totals(&self) -> ReportTotals {
        self.totals
    }

    /// Whether no rows are displayed.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Rows dated inside `range`, in input order.
pub fn filter_rows(rows: &[ReportRow], range: &DateRange) -> Vec<ReportRow> {
    rows.iter()
        .filter(|row| range.contains(row.date))
        .cloned()
        .collect()
}

/// Fetch the full history for `shop_id` and reduce it to `range`.
pub async fn fetch_report<A: ShopApi>(
    api: &A,
    shop_id: Option<&str>,
    range: DateRange,
) -> Result<ReportView> {
    let shop_id = shop_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ConsoleError::MissingShop)?;

    let report = api.reports(shop_id).await?;
    let rows: Vec<ReportRow> = report
        .reports
        .iter()
        .filter_map(|raw| {
            let row = ReportRow::from_raw(raw);
            if row.is_none() {
                warn!(shop_id, date = %raw.date, "Skipping report row with unreadable date");
            }
            row
        })
        .collect();

    let view = ReportView::from_rows(filter_rows(&rows, &range));
    info!(
        shop_id,
        %range,
        fetched = rows.len(),
        shown = view.rows().len(),
        "Report aggregated"
    );
    Ok(view)
}

/// Report screen state: the duration selector, the two date fields and the
/// last successful result.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportAggregator {
    period: ReportPeriod,
    from_input: String,
    to_input: String,
    view: ReportView,
}

impl ReportAggregator {
    /// Start on "today" relative to the shop's current date.
    pub fn new(today: NaiveDate) -> Self {
        let mut aggregator = Self {
            period: ReportPeriod::Today,
            from_input: String::new(),
            to_input: String::new(),
            view: ReportView::default(),
        };
        aggregator.select_period(ReportPeriod::Today, today);
        aggregator
    }

    /// Current selector value.
    pub fn period(&self) -> ReportPeriod {
        self.period
    }

    /// Change the selector. Non-custom values rewrite both date fields;
    /// `Custom` leaves them as typed.
    pub fn select_period(&mut self, period: ReportPeriod, today: NaiveDate) {
        self.period = period;
        if let Some(range) = period.range(today) {
            self.from_input = range.from.format(DATE_INPUT_FORMAT).to_string();
            self.to_input = range.to.format(DATE_INPUT_FORMAT).to_string();
        }
    }

    /// Text of the "from" field.
    pub fn from_input(&self) -> &str {
        &self.from_input
    }

    /// Text of the "to" field.
    pub fn to_input(&self) -> &str {
        &self.to_input
    }

    /// Replace the "from" field.
    pub fn set_from_input(&mut self, value: impl Into<String>) {
        self.from_input = value.into();
    }

    /// Replace the "to" field.
    pub fn set_to_input(&mut self, value: impl Into<String>) {
        self.to_input = value.into();
    }

    /// Range described by the two fields.
    pub fn range(&self) -> Result<DateRange> {
        let from = parse_date_input("from", &self.from_input)?;
        let to = parse_date_input("to", &self.to_input)?;
        Ok(DateRange::new(from, to)?)
    }

    /// Last successful result, or empty.
    pub fn view(&self) -> &ReportView {
        &self.view
    }

    /// Drop any displayed rows and zero the totals.
    pub fn reset_view(&mut self) {
        self.view = ReportView::default();
    }

    /// Install the outcome of a query; a failure clears the view and is
    /// handed back to the caller.
    pub fn apply(&mut self, result: Result<ReportView>) -> Result<()> {
        match result {
            Ok(view) => {
                self.view = view;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Report query failed; clearing view");
                self.reset_view();
                Err(err)
            }
        }
    }

    /// Validate the fields, re-fetch the full history and display the rows
    /// inside the range.
    pub async fn submit<A: ShopApi>(
        &mut self,
        api: &A,
        shop_id: Option<&str>,
    ) -> Result<&ReportView> {
        let result = match self.range() {
            Ok(range) => fetch_report(api, shop_id, range).await,
            Err(err) => Err(err),
        };
        self.apply(result)?;
        Ok(&self.view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{testing::ScriptedApi, ShopReport},
        error::ValidationError,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn raw(date: &str, play_count: u64, placed: f64) -> RawReportRow {
        RawReportRow {
            date: date.to_string(),
            play_count,
            placed_bets: placed,
            awarded: placed * 0.7,
            net_cash: placed * 0.3,
            company_commission: placed * 0.1,
        }
    }

    fn history() -> ShopReport {
        ShopReport {
            shop_id: "lidu".to_string(),
            reports: vec![
                raw("2024-01-01", 5, 50.0),
                raw("2024-01-02", 3, 30.0),
                raw("2024-01-03T18:45:00", 7, 70.0),
            ],
        }
    }

    fn custom(from: &str, to: &str) -> ReportAggregator {
        let mut aggregator = ReportAggregator::new(date(2024, 1, 3));
        aggregator.select_period(ReportPeriod::Custom, date(2024, 1, 3));
        aggregator.set_from_input(from);
        aggregator.set_to_input(to);
        aggregator
    }

    #[test]
    fn totals_sum_field_wise() {
        let rows: Vec<ReportRow> = history()
            .reports
            .iter()
            .filter_map(ReportRow::from_raw)
            .collect();
        let totals = ReportTotals::sum(&rows);
        assert_eq!(totals.play_count, 15);
        assert!((totals.placed_bet - 150.0).abs() < 1e-9);
        assert!((totals.commission_amount - 15.0).abs() < 1e-9);
        assert_eq!(ReportTotals::sum(&[]), ReportTotals::default());
    }

    #[test]
    fn report_dates_accept_common_shapes() {
        let midnight = date(2024, 1, 2).and_time(NaiveTime::MIN);
        assert_eq!(parse_report_date("2024-01-02"), Some(midnight));
        assert_eq!(
            parse_report_date("2024-01-02T10:15:00.250"),
            date(2024, 1, 2).and_hms_milli_opt(10, 15, 0, 250)
        );
        assert_eq!(
            parse_report_date("2024-01-02T10:15:00+03:00"),
            date(2024, 1, 2).and_hms_opt(10, 15, 0)
        );
        assert_eq!(parse_report_date("yesterday"), None);
    }

    #[tokio::test]
    async fn only_rows_inside_the_range_count() -> anyhow::Result<()> {
        let api = ScriptedApi::default();
        api.reports.lock().push_back(Ok(history()));

        let mut aggregator = custom("2024-01-02", "2024-01-03");
        let view = aggregator.submit(&api, Some("lidu")).await?;
        assert_eq!(view.rows().len(), 2);
        assert_eq!(view.totals().play_count, 10);
        assert!((view.totals().placed_bet - 100.0).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn every_submission_refetches_history() -> anyhow::Result<()> {
        let api = ScriptedApi::default();
        api.reports.lock().push_back(Ok(history()));
        api.reports.lock().push_back(Ok(history()));

        let mut aggregator = custom("2024-01-01", "2024-01-01");
        aggregator.submit(&api, Some("lidu")).await?;
        aggregator.submit(&api, Some("lidu")).await?;
        assert_eq!(api.calls().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn failed_fetch_clears_previous_result() -> anyhow::Result<()> {
        let api = ScriptedApi::default();
        api.reports.lock().push_back(Ok(history()));
        api.reports
            .lock()
            .push_back(Err(ConsoleError::Fetch("connection reset".to_string())));

        let mut aggregator = custom("2024-01-01", "2024-01-03");
        aggregator.submit(&api, Some("lidu")).await?;
        assert_eq!(aggregator.view().totals().play_count, 15);

        let result = aggregator.submit(&api, Some("lidu")).await;
        assert!(matches!(result, Err(ConsoleError::Fetch(_))));
        assert!(aggregator.view().is_empty());
        assert_eq!(aggregator.view().totals(), ReportTotals::default());
        Ok(())
    }

    #[tokio::test]
    async fn missing_shop_fails_without_fetching() {
        let api = ScriptedApi::default();
        let mut aggregator = custom("2024-01-01", "2024-01-03");
        let result = aggregator.submit(&api, None).await;
        assert!(matches!(result, Err(ConsoleError::MissingShop)));
        assert!(api.calls().is_empty());
        assert!(aggregator.view().is_empty());
    }

    #[tokio::test]
    async fn invalid_fields_fail_without_fetching() {
        let api = ScriptedApi::default();
        let mut aggregator = custom("2024-01-05", "2024-01-01");
        let result = aggregator.submit(&api, Some("lidu")).await;
        assert!(matches!(
            result,
            Err(ConsoleError::Validation(ValidationError::InvertedRange { .. }))
        ));

        aggregator.set_from_input("01/05/2024");
        let result = aggregator.submit(&api, Some("lidu")).await;
        assert!(matches!(
            result,
            Err(ConsoleError::Validation(ValidationError::InvalidDate { .. }))
        ));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn selector_rewrites_fields_except_for_custom() {
        let today = date(2024, 3, 13);
        let mut aggregator = ReportAggregator::new(today);
        assert_eq!(aggregator.from_input(), "2024-03-13");
        assert_eq!(aggregator.to_input(), "2024-03-13");

        aggregator.select_period(ReportPeriod::LastMonth, today);
        assert_eq!(aggregator.from_input(), "2024-02-01");
        assert_eq!(aggregator.to_input(), "2024-02-29");

        aggregator.set_from_input("2024-02-10");
        aggregator.select_period(ReportPeriod::Custom, today);
        assert_eq!(aggregator.period(), ReportPeriod::Custom);
        assert_eq!(aggregator.from_input(), "2024-02-10");
        assert_eq!(aggregator.to_input(), "2024-02-29");
    }

    #[tokio::test]
    async fn unreadable_rows_are_skipped() -> anyhow::Result<()> {
        let api = ScriptedApi::default();
        let mut report = history();
        report.reports.push(raw("not a date", 100, 1000.0));
        api.reports.lock().push_back(Ok(report));

        let view = fetch_report(
            &api,
            Some("lidu"),
            DateRange::new(date(2024, 1, 1), date(2024, 12, 31))?,
        )
        .await?;
        assert_eq!(view.totals().play_count, 15);
        Ok(())
    }
}
