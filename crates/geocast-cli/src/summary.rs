use chrono::{DateTime, NaiveDate};

use crate::model::{DailySummary, ForecastPeriod};

/// Buckets periods by the calendar date of their `start_time`, taken in the
/// period's own UTC offset. Days keep the order in which they first appear.
/// A missing precipitation chance counts as 0 in the average.
pub fn summarize(periods: &[ForecastPeriod]) -> Vec<DailySummary> {
    let mut days: Vec<DayBucket> = Vec::new();

    for period in periods {
        let Some(date) = period_date(&period.start_time) else {
            tracing::warn!(
                name = %period.name,
                start_time = %period.start_time,
                "skipping period with unparseable start time"
            );
            continue;
        };

        let chance = u32::from(period.precipitation_probability.unwrap_or(0));
        match days.iter_mut().find(|day| day.date == date) {
            Some(day) => day.push(period.temperature, chance),
            None => days.push(DayBucket::new(date, period.temperature, chance)),
        }
    }

    days.into_iter().map(DayBucket::finish).collect()
}

fn period_date(start_time: &str) -> Option<NaiveDate> {
    let raw = start_time.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.date_naive());
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z") {
        return Some(parsed.date_naive());
    }

    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

struct DayBucket {
    date: NaiveDate,
    high: i32,
    low: i32,
    chance_total: u32,
    count: u32,
}

impl DayBucket {
    fn new(date: NaiveDate, temperature: i32, chance: u32) -> Self {
        Self {
            date,
            high: temperature,
            low: temperature,
            chance_total: chance,
            count: 1,
        }
    }

    fn push(&mut self, temperature: i32, chance: u32) {
        self.high = self.high.max(temperature);
        self.low = self.low.min(temperature);
        self.chance_total += chance;
        self.count += 1;
    }

    fn finish(self) -> DailySummary {
        let average = f64::from(self.chance_total) / f64::from(self.count);
        DailySummary {
            date: self.date,
            high_temp: self.high,
            low_temp: self.low,
            avg_chance_of_rain: average.round().clamp(0.0, 100.0) as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(name: &str, temperature: i32, start_time: &str, rain: Option<u8>) -> ForecastPeriod {
        ForecastPeriod {
            name: name.to_string(),
            temperature,
            short_forecast: "Sunny".to_string(),
            icon: String::new(),
            start_time: start_time.to_string(),
            precipitation_probability: rain,
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("date")
    }

    #[test]
    fn summarize_collapses_a_day_into_high_low_and_average_rain() {
        let periods = vec![
            period("This Afternoon", 75, "2024-11-20T10:00-06:00", None),
            period("Tonight", 55, "2024-11-20T18:00-06:00", Some(30)),
        ];

        assert_eq!(
            summarize(&periods),
            vec![DailySummary {
                date: date(2024, 11, 20),
                high_temp: 75,
                low_temp: 55,
                avg_chance_of_rain: 15,
            }]
        );
    }

    #[test]
    fn summarize_empty_input_is_empty() {
        assert!(summarize(&[]).is_empty());
    }

    #[test]
    fn summarize_is_idempotent() {
        let periods = vec![
            period("Today", 61, "2024-11-20T06:00:00-08:00", Some(10)),
            period("Tonight", 48, "2024-11-20T18:00:00-08:00", Some(40)),
            period("Thursday", 63, "2024-11-21T06:00:00-08:00", Some(5)),
        ];

        assert_eq!(summarize(&periods), summarize(&periods));
    }

    #[test]
    fn summarize_keeps_first_appearance_order() {
        let periods = vec![
            period("Thursday", 63, "2024-11-21T06:00:00-08:00", None),
            period("Wednesday", 61, "2024-11-20T06:00:00-08:00", None),
            period("Thursday Night", 50, "2024-11-21T18:00:00-08:00", None),
        ];

        let days = summarize(&periods);

        assert_eq!(
            days.iter().map(|day| day.date).collect::<Vec<_>>(),
            vec![date(2024, 11, 21), date(2024, 11, 20)]
        );
        assert_eq!((days[0].high_temp, days[0].low_temp), (63, 50));
    }

    #[test]
    fn summarize_uses_the_period_offset_not_utc() {
        let periods = vec![period("Tonight", 40, "2024-11-20T22:00:00-06:00", None)];

        assert_eq!(summarize(&periods)[0].date, date(2024, 11, 20));
    }

    #[test]
    fn summarize_rounds_average_rain_half_away_from_zero() {
        let periods = vec![
            period("A", 70, "2024-11-20T06:00:00-06:00", Some(1)),
            period("B", 70, "2024-11-20T12:00:00-06:00", Some(2)),
        ];

        assert_eq!(summarize(&periods)[0].avg_chance_of_rain, 2);
    }

    #[test]
    fn summarize_skips_unparseable_start_times() {
        let periods = vec![
            period("Garbled", 99, "soon", Some(100)),
            period("Today", 70, "2024-11-20T06:00:00-06:00", Some(20)),
        ];

        assert_eq!(
            summarize(&periods),
            vec![DailySummary {
                date: date(2024, 11, 20),
                high_temp: 70,
                low_temp: 70,
                avg_chance_of_rain: 20,
            }]
        );
    }

    #[test]
    fn period_date_falls_back_to_date_prefix() {
        assert_eq!(period_date("2024-11-20 morning"), Some(date(2024, 11, 20)));
        assert_eq!(period_date("11/20/2024"), None);
    }
}
