pub mod calendar;

pub use calendar::{CalendarBoundsExceeded, TradingCalendar, TradingDayTable};
