use chrono::{Duration, NaiveDate};

use bic_core::composite::{composite, composite_with_boom_reference, CompositeInput};
use bic_core::onset::{Confidence, OnsetRecord};
use bic_core::series::{Channel, StationCode, StationYear, StationYearKey, TimeSeries};
use bic_core::PipelineError;

struct Fixture {
    station_year: StationYear,
    onset: OnsetRecord,
    corrected: TimeSeries,
}

impl Fixture {
    /// Every channel holds `value`; the onset falls `onset_index` days after June 1st.
    fn new(
        station: &str,
        year: i32,
        len: usize,
        value: f64,
        onset_index: Option<i64>,
        albedo_at_onset: Option<f64>,
    ) -> Self {
        let start = NaiveDate::from_ymd_opt(year, 6, 1).expect("valid date");
        let series = TimeSeries::from_values(start, &vec![Some(value); len]);
        let key = StationYearKey::new(StationCode::try_from(station).expect("code"), year);
        let station_year = StationYear::new(
            key,
            series.clone(),
            series.clone(),
            series.clone(),
            series.clone(),
        )
        .expect("station-year");

        let onset = OnsetRecord {
            station: station_year.station().clone(),
            year,
            onset_date: onset_index.map(|idx| start + Duration::days(idx)),
            albedo: albedo_at_onset,
            confidence: Confidence::High,
            flags: Vec::new(),
        };

        Self {
            station_year,
            onset,
            corrected: series,
        }
    }

    fn with_corrected(mut self, corrected: TimeSeries) -> Self {
        self.corrected = corrected;
        self
    }

    fn with_boom(mut self, boom: &[Option<f64>]) -> Self {
        let start = self.station_year.dates().next().expect("non-empty");
        self.station_year = self
            .station_year
            .with_channel(Channel::BoomHeight, TimeSeries::from_values(start, boom))
            .expect("boom aligned");
        self
    }

    fn input(&self) -> CompositeInput<'_> {
        CompositeInput {
            station_year: &self.station_year,
            onset: &self.onset,
            corrected_ablation: &self.corrected,
        }
    }
}

#[test]
fn identical_onset_albedos_give_zero_spread() {
    let a = Fixture::new("KAN_L", 2012, 11, 1.0, Some(5), Some(0.55));
    let b = Fixture::new("KAN_M", 2013, 11, 1.0, Some(5), Some(0.55));

    let result = composite(&[a.input(), b.input()], 3).expect("composite");

    assert_eq!(result.onset_albedo.mean, Some(0.55));
    assert_eq!(result.onset_albedo.std, Some(0.0));
    assert_eq!(result.onset_albedo.count, 2);
    assert_eq!(result.offsets, (-3..=3).collect::<Vec<i64>>());
    assert_eq!(result.station_count, 2);
    assert_eq!(result.excluded, 0);
}

#[test]
fn offsets_without_data_have_no_statistics() {
    // Three days of data centred on the onset, composited over ±5 days.
    let a = Fixture::new("KAN_L", 2012, 3, 2.0, Some(1), Some(0.6));
    let result = composite(&[a.input()], 5).expect("composite");

    let far = result.statistic(Channel::Temperature, 4).expect("offset in range");
    assert_eq!(far.mean, None);
    assert_eq!(far.std, None);
    assert_eq!(far.count, 0);

    let centre = result.statistic(Channel::Temperature, 0).expect("offset in range");
    assert_eq!(centre.mean, Some(2.0));
    assert_eq!(centre.std, None, "one contributor has no sample deviation");
    assert_eq!(centre.count, 1);

    assert!(result.statistic(Channel::Temperature, 6).is_none());
    assert_eq!(result.onset_albedo.std, None);
}

#[test]
fn non_positive_window_is_rejected() {
    let a = Fixture::new("KAN_L", 2012, 5, 1.0, Some(2), Some(0.6));
    for dt in [0, -1] {
        let err = composite(&[a.input()], dt).expect_err("dt must be positive");
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }
}

#[test]
fn partial_coverage_contributes_its_range() {
    let full = Fixture::new("KAN_L", 2012, 10, 1.0, Some(3), Some(0.6));
    // Onset on the first day: nothing before offset 0.
    let late = Fixture::new("KAN_M", 2012, 4, 3.0, Some(0), None);

    let result = composite(&[full.input(), late.input()], 3).expect("composite");

    let before = result.statistic(Channel::SnowHeight, -2).expect("offset");
    assert_eq!((before.count, before.mean), (1, Some(1.0)));

    let after = result.statistic(Channel::SnowHeight, 2).expect("offset");
    assert_eq!((after.count, after.mean), (2, Some(2.0)));
    let std = after.std.expect("two contributors");
    assert!((std - 2f64.sqrt()).abs() < 1e-12);

    // Missing onset albedo only drops out of the albedo aggregate.
    assert_eq!(result.onset_albedo.count, 1);
    assert_eq!(result.contributors.len(), 2);
}

#[test]
fn undetected_station_years_are_excluded_and_counted() {
    let a = Fixture::new("KAN_L", 2012, 10, 1.0, Some(4), Some(0.5));
    let b = Fixture::new("KAN_L", 2013, 10, 1.0, Some(4), Some(0.6));
    let c = Fixture::new("KAN_M", 2012, 10, 1.0, None, None);

    let result = composite(&[a.input(), b.input(), c.input()], 2).expect("composite");

    assert_eq!(result.excluded, 1);
    assert_eq!(result.station_year_count(), 2);
    assert_eq!(result.station_count, 1);
    let keys: Vec<String> = result.contributors.iter().map(|k| k.to_string()).collect();
    assert_eq!(keys, vec!["KAN_L_2012", "KAN_L_2013"]);
}

#[test]
fn no_detected_onset_is_an_error() {
    let a = Fixture::new("KAN_L", 2012, 10, 1.0, None, None);
    let b = Fixture::new("KAN_M", 2012, 10, 1.0, None, None);

    let err = composite(&[a.input(), b.input()], 5).expect_err("nothing to composite");
    assert!(matches!(err, PipelineError::NoContributors { excluded: 2 }));
}

#[test]
fn ablation_channel_uses_corrected_series() {
    let start = NaiveDate::from_ymd_opt(2012, 6, 1).expect("valid date");
    let corrected = TimeSeries::from_values(start, &[Some(-0.5), Some(0.0), Some(0.5)]);
    let a = Fixture::new("KAN_L", 2012, 3, 9.0, Some(1), Some(0.6)).with_corrected(corrected);

    let result = composite(&[a.input()], 1).expect("composite");

    let ablation = result.channel(Channel::Ablation).expect("ablation composite");
    assert_eq!(ablation.rows.len(), 1);
    assert_eq!(ablation.rows[0].values, vec![Some(-0.5), Some(0.0), Some(0.5)]);

    let temperature = result.channel(Channel::Temperature).expect("temperature composite");
    assert_eq!(temperature.rows[0].values, vec![Some(9.0); 3]);
}

#[test]
fn boom_height_is_composited_above_its_reference_level() {
    let a = Fixture::new("KAN_L", 2012, 5, 0.0, Some(2), Some(0.6)).with_boom(&[
        Some(1.0),
        Some(1.1),
        Some(1.2),
        Some(1.4),
        Some(1.6),
    ]);

    // Reference over offsets 1 and 2: (1.4 + 1.6) / 2.
    let result = composite_with_boom_reference(&[a.input()], 2, 1..3).expect("composite");
    let boom = result.channel(Channel::BoomHeight).expect("boom composite");
    let expected = [0.5, 0.4, 0.3, 0.1, -0.1];
    for (value, want) in boom.rows[0].values.iter().zip(expected) {
        let value = value.expect("present");
        assert!((value - want).abs() < 1e-9, "{value} != {want}");
    }
}

#[test]
fn boom_height_without_reference_values_is_missing() {
    let a = Fixture::new("KAN_L", 2012, 5, 0.0, Some(2), Some(0.6)).with_boom(&[
        Some(1.0),
        Some(1.1),
        Some(1.2),
        None,
        None,
    ]);
    let b = Fixture::new("KAN_M", 2012, 5, 0.0, Some(2), Some(0.6));

    let result = composite_with_boom_reference(&[a.input(), b.input()], 2, 1..3).expect("composite");
    let boom = result.channel(Channel::BoomHeight).expect("boom composite");
    assert!(boom.rows.iter().all(|row| row.values.iter().all(Option::is_none)));
    assert!(boom.statistics.iter().all(|stat| stat.count == 0));

    // Other channels are unaffected.
    let albedo = result.statistic(Channel::Albedo, 0).expect("albedo at onset");
    assert_eq!(albedo.count, 2);
}

#[test]
fn default_boom_reference_spans_offsets_ten_to_twenty_nine() {
    let boom: Vec<Option<f64>> = (0..61).map(|day| Some(day as f64)).collect();
    let a = Fixture::new("KAN_L", 2012, 61, 0.0, Some(30), Some(0.6)).with_boom(&boom);

    let result = composite(&[a.input()], 30).expect("composite");
    // Offsets 10..=29 are days 40..=59, mean 49.5.
    let at_onset = result
        .statistic(Channel::BoomHeight, 0)
        .and_then(|s| s.mean)
        .expect("boom at onset");
    assert!((at_onset - 19.5).abs() < 1e-9);
}
