//! Report period selection and aggregation of a shop's daily history.

/// Report row conversion, filtering and totals.
pub mod aggregate;
/// Duration selector and civil-calendar date ranges.
pub mod period;

pub use aggregate::{fetch_report, filter_rows, ReportAggregator, ReportRow, ReportTotals, ReportView};
pub use period::{shop_today, shop_today_at, DateRange, ReportPeriod};
