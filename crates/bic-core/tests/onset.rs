use chrono::{Duration, NaiveDate};

use bic_core::config::DetectionConfig;
use bic_core::onset::{detect_onset, Confidence, OnsetFlag};
use bic_core::series::{StationCode, StationYear, StationYearKey, TimeSeries};

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2012, 5, 1).expect("valid date") + Duration::days(offset)
}

fn padded(values: &[Option<f64>], len: usize, fill: Option<f64>) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    out.resize(len, fill);
    out
}

fn station_year(
    snow: &[Option<f64>],
    ablation: &[Option<f64>],
    temperature: &[Option<f64>],
    albedo: &[Option<f64>],
) -> StationYear {
    let key = StationYearKey::new(StationCode::try_from("KAN_L").expect("code"), 2012);
    StationYear::new(
        key,
        TimeSeries::from_values(day(0), temperature),
        TimeSeries::from_values(day(0), snow),
        TimeSeries::from_values(day(0), ablation),
        TimeSeries::from_values(day(0), albedo),
    )
    .expect("aligned station-year")
}

fn some(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(Some).collect()
}

#[test]
fn detects_example_onset_on_day_five() {
    let snow = some(&[50.0, 50.0, 30.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let ablation = some(&[0.0, 0.0, 0.0, 0.0, 2.0, 5.0, 9.0, 14.0, 20.0, 27.0]);
    let temperature = some(&[-4.0, -3.0, -1.0, 0.5, 1.0, 2.0, 2.0, 3.0, 3.0, 3.0]);
    let albedo = some(&[0.84, 0.83, 0.82, 0.8, 0.62, 0.6, 0.58, 0.55, 0.52, 0.5]);
    let sy = station_year(&snow, &ablation, &temperature, &albedo);

    let record = detect_onset(&sy, sy.ablation(), &DetectionConfig::default());

    assert_eq!(record.onset_date, Some(day(4)));
    assert_eq!(record.albedo, Some(0.62));
    assert_eq!(record.confidence, Confidence::High);
    assert!(record.flags.is_empty());
    assert_eq!(record.station.as_str(), "KAN_L");
    assert_eq!(record.year, 2012);
}

#[test]
fn flat_ablation_under_snow_is_undetected() {
    let snow = vec![Some(0.4); 30];
    let ablation = vec![Some(0.0); 30];
    let temperature = vec![Some(-2.0); 30];
    let albedo = vec![Some(0.8); 30];
    let sy = station_year(&snow, &ablation, &temperature, &albedo);

    let record = detect_onset(&sy, sy.ablation(), &DetectionConfig::default());

    assert!(!record.is_detected());
    assert_eq!(record.albedo, None);
    assert_eq!(record.onset_day_of_year(), None);
}

#[test]
fn detection_is_idempotent() {
    let snow = some(&[0.3, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let ablation = some(&[0.0, 0.0, 0.0, 0.01, 0.02, 0.03, 0.04]);
    let temperature = vec![Some(1.0); 7];
    let albedo = vec![Some(0.7); 7];
    let sy = station_year(&snow, &ablation, &temperature, &albedo);
    let config = DetectionConfig::default();

    let first = detect_onset(&sy, sy.ablation(), &config);
    let second = detect_onset(&sy, sy.ablation(), &config);
    assert_eq!(first, second);
    assert_eq!(first.onset_date, Some(day(3)));
}

#[test]
fn single_day_spike_is_not_an_onset() {
    let snow = vec![Some(0.0); 12];
    let ablation = some(&[0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 0.5, 0.6, 0.7, 0.8, 0.9]);
    let temperature = vec![Some(1.0); 12];
    let albedo = vec![Some(0.6); 12];
    let sy = station_year(&snow, &ablation, &temperature, &albedo);

    let record = detect_onset(&sy, sy.ablation(), &DetectionConfig::default());
    assert_eq!(record.onset_date, Some(day(8)));
}

#[test]
fn snow_cover_blocks_candidates() {
    let snow = some(&[0.5, 0.5, 0.0, 0.4, 0.3, 0.0, 0.0, 0.0, 0.0]);
    let ablation = some(&[0.0, 0.0, 0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
    let temperature = vec![Some(1.0); 9];
    let albedo = vec![Some(0.6); 9];
    let sy = station_year(&snow, &ablation, &temperature, &albedo);

    let record = detect_onset(&sy, sy.ablation(), &DetectionConfig::default());
    assert_eq!(record.onset_date, Some(day(5)));
}

#[test]
fn corrected_ablation_is_read_by_date() {
    let snow = vec![Some(0.0); 8];
    let raw = vec![Some(0.0); 8];
    let temperature = vec![Some(1.0); 8];
    let albedo = vec![Some(0.6); 8];
    let sy = station_year(&snow, &raw, &temperature, &albedo);

    let corrected = TimeSeries::from_values(
        day(0),
        &some(&[0.0, 0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6]),
    );
    let record = detect_onset(&sy, &corrected, &DetectionConfig::default());
    assert_eq!(record.onset_date, Some(day(2)));
}

#[test]
fn missing_snow_channel_waives_snow_condition() {
    let snow = vec![None; 8];
    let ablation = some(&[0.0, 0.0, 0.0, 0.0, 0.05, 0.1, 0.15, 0.2]);
    let temperature = vec![Some(1.0); 8];
    let albedo = vec![Some(0.6); 8];
    let sy = station_year(&snow, &ablation, &temperature, &albedo);

    let record = detect_onset(&sy, sy.ablation(), &DetectionConfig::default());
    assert_eq!(record.onset_date, Some(day(4)));
    assert_eq!(record.confidence, Confidence::Low);
    assert!(record.has_flag(OnsetFlag::SnowChannelMissing));
}

fn sparse_station_year(temperature: &[Option<f64>]) -> StationYear {
    let len = 40;
    let snow = padded(&[Some(0.5); 10], len, Some(0.0));
    let mut ablation = padded(&[Some(0.0); 10], len, None);
    for (idx, value) in [(10, 0.1), (11, 0.2), (12, 0.3)] {
        ablation[idx] = Some(value);
    }
    for (idx, slot) in ablation.iter_mut().enumerate().skip(21) {
        *slot = Some(0.5 + (idx - 21) as f64 * 0.05);
    }
    let albedo = vec![Some(0.6); len];
    station_year(&snow, &ablation, temperature, &albedo)
}

#[test]
fn sparse_ablation_without_thaw_is_low_confidence() {
    let sy = sparse_station_year(&[Some(-5.0); 40]);
    let record = detect_onset(&sy, sy.ablation(), &DetectionConfig::default());

    assert_eq!(record.onset_date, Some(day(10)));
    assert_eq!(record.confidence, Confidence::Low);
    assert!(record.has_flag(OnsetFlag::SparseAblation));
    assert!(record.has_flag(OnsetFlag::NoTemperatureCrossing));
}

#[test]
fn sparse_ablation_with_distant_thaw_is_low_confidence() {
    let temperature = padded(&[Some(-5.0); 30], 40, Some(2.0));
    let sy = sparse_station_year(&temperature);
    let record = detect_onset(&sy, sy.ablation(), &DetectionConfig::default());

    assert_eq!(record.onset_date, Some(day(10)));
    assert_eq!(record.confidence, Confidence::Low);
    assert!(record.has_flag(OnsetFlag::TemperatureDisagreement));
}

#[test]
fn sparse_ablation_with_agreeing_thaw_keeps_high_confidence() {
    let temperature = padded(&[Some(-5.0); 8], 40, Some(2.0));
    let sy = sparse_station_year(&temperature);
    let record = detect_onset(&sy, sy.ablation(), &DetectionConfig::default());

    assert_eq!(record.onset_date, Some(day(10)));
    assert_eq!(record.confidence, Confidence::High);
    assert_eq!(record.flags, vec![OnsetFlag::SparseAblation]);
}

#[test]
fn missing_albedo_at_onset_is_none() {
    let snow = some(&[0.1, 0.0, 0.0, 0.0, 0.0]);
    let ablation = some(&[0.0, 0.01, 0.02, 0.03, 0.04]);
    let temperature = vec![Some(1.0); 5];
    let albedo = vec![Some(0.7), None, Some(0.6), Some(0.6), Some(0.6)];
    let sy = station_year(&snow, &ablation, &temperature, &albedo);

    let record = detect_onset(&sy, sy.ablation(), &DetectionConfig::default());
    assert_eq!(record.onset_date, Some(day(1)));
    assert_eq!(record.albedo, None);
}
