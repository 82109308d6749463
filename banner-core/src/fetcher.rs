use chrono::Utc;
use log::{info, warn};

use crate::{
    config::SourceConfig,
    error::FetchError,
    extract::extract_from_html,
    model::{Snapshot, StationConfig, StationResult},
    provider::StationSource,
};

/// Fetches stations one at a time, in configured order.
#[derive(Debug)]
pub struct Fetcher<'a> {
    source: &'a dyn StationSource,
    config: &'a SourceConfig,
}

impl<'a> Fetcher<'a> {
    pub fn new(source: &'a dyn StationSource, config: &'a SourceConfig) -> Self {
        Self { source, config }
    }

    /// Fetch every station and collect the results. Individual station
    /// failures are recorded in the snapshot and never abort the batch.
    pub async fn run(&self, stations: &[StationConfig]) -> Snapshot {
        let mut snapshot = Snapshot::new(self.config.name.as_str(), Utc::now());
        let total = stations.len();

        for (i, station) in stations.iter().enumerate() {
            info!("[{}/{}] Processing {} - {}", i + 1, total, station.code, station.display_name);

            let result = self.fetch_station(station).await;
            snapshot.insert(station.code.as_str(), result);

            let delay = self.config.politeness_delay();
            if i + 1 < total && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        snapshot.metadata.last_updated = Utc::now();
        snapshot
    }

    /// Fetch and extract one station. Never fails: problems become a
    /// `success: false` result with sentinel values.
    pub async fn fetch_station(&self, station: &StationConfig) -> StationResult {
        let url = self.source.station_url(station);

        let page = match self.fetch_with_retry(station).await {
            Ok(page) => page,
            Err(e) => {
                warn!("{}: giving up: {e}", station.code);
                return StationResult::failed(station, e.to_string(), url, Utc::now());
            }
        };

        match extract_from_html(&page) {
            Ok(extraction) => {
                let values = extraction.values;
                info!(
                    "{}: TX={}°C, TN={}°C, PPT={}mm ({:?})",
                    station.code, values.tx, values.tn, values.ppt, extraction.mode
                );
                StationResult::succeeded(station, values, url, Utc::now())
            }
            Err(e) => {
                warn!("{}: {e}", station.code);
                StationResult::failed(station, e.to_string(), url, Utc::now())
            }
        }
    }

    async fn fetch_with_retry(&self, station: &StationConfig) -> Result<String, FetchError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            log::debug!("{}: attempt {attempt}/{max_attempts}", station.code);

            match self.source.fetch_page(station).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.config.retry_delay() * attempt;
                    warn!(
                        "{}: attempt {attempt}/{max_attempts} failed ({e}), retrying in {:?}",
                        station.code, delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Log the end-of-run summary: counts, failed stations, a few samples.
pub fn log_summary(snapshot: &Snapshot, stations: &[StationConfig]) {
    let total = stations.len();
    let ok = snapshot.success_count();
    let failed = snapshot.failed_codes();

    info!("Stations succeeded: {ok}/{total}");
    if failed.is_empty() {
        return;
    }

    warn!("Stations failed: {}", failed.len());
    for code in &failed {
        let name = stations
            .iter()
            .find(|s| s.code == *code)
            .map_or(*code, |s| s.display_name.as_str());
        warn!("   - {code}: {name}");
    }

    stations
        .iter()
        .filter_map(|s| snapshot.get(&s.code).filter(|r| r.success).map(|r| (s, r)))
        .take(3)
        .for_each(|(s, r)| {
            info!(
                "   {} - {}: TX {}°C | TN {}°C | PPT {}mm",
                s.code, s.display_name, r.values.tx, r.values.tn, r.values.ppt
            );
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Measurement;
    use async_trait::async_trait;
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    /// Serves canned pages; each station may first fail a number of times.
    #[derive(Debug, Default)]
    struct FakeSource {
        pages: HashMap<String, String>,
        failures: Mutex<HashMap<String, Vec<FetchError>>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn with_page(mut self, code: &str, html: &str) -> Self {
            self.pages.insert(code.to_string(), html.to_string());
            self
        }

        fn failing_first(self, code: &str, errors: Vec<FetchError>) -> Self {
            self.failures.lock().unwrap().insert(code.to_string(), errors);
            self
        }
    }

    #[async_trait]
    impl StationSource for FakeSource {
        fn station_url(&self, station: &StationConfig) -> String {
            format!("fake://{}", station.code)
        }

        async fn fetch_page(&self, station: &StationConfig) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(errors) = self.failures.lock().unwrap().get_mut(&station.code) {
                if !errors.is_empty() {
                    return Err(errors.remove(0));
                }
            }

            self.pages
                .get(&station.code)
                .cloned()
                .ok_or_else(|| FetchError::HttpStatus {
                    url: self.station_url(station),
                    status: 404,
                    body: String::new(),
                })
        }
    }

    fn no_delay_config(max_attempts: u32) -> SourceConfig {
        SourceConfig { max_attempts, retry_delay_ms: 0, politeness_delay_ms: 0, ..Default::default() }
    }

    fn station(code: &str) -> StationConfig {
        StationConfig::new(code, code, format!("STATION {code}")).unwrap()
    }

    const PAGE: &str = r#"<table class="table-dades">
        <tr><th>Període</th><th>TX (°C)</th><th>TN (°C)</th><th>PPT (mm)</th></tr>
        <tr><td>00:00 - 00:30</td><td>12.0</td><td>3.0</td><td>0.0</td></tr>
        <tr><td>00:30 - 01:00</td><td>14.5</td><td>1.5</td><td>1.2</td></tr>
        <tr><td>01:00 - 01:30</td><td>9.0</td><td>5.0</td><td>0.0</td></tr>
    </table>"#;

    fn empty_body(code: &str) -> FetchError {
        FetchError::EmptyBody(format!("fake://{code}"))
    }

    #[tokio::test]
    async fn successful_station_is_reduced() {
        let source = FakeSource::default().with_page("XJ", PAGE);
        let config = no_delay_config(3);

        let result = Fetcher::new(&source, &config).fetch_station(&station("XJ")).await;

        assert!(result.success);
        assert_eq!(result.values.tx, Measurement::Value(14.5));
        assert_eq!(result.values.tn, Measurement::Value(1.5));
        assert_eq!(result.values.ppt, Measurement::Value(1.2));
        assert_eq!(result.metadata.url, "fake://XJ");
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let source = FakeSource::default()
            .with_page("XJ", PAGE)
            .failing_first("XJ", vec![empty_body("XJ"), empty_body("XJ")]);
        let config = no_delay_config(3);

        let result = Fetcher::new(&source, &config).fetch_station(&station("XJ")).await;

        assert!(result.success);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let source = FakeSource::default()
            .with_page("XJ", PAGE)
            .failing_first("XJ", vec![empty_body("XJ"), empty_body("XJ"), empty_body("XJ")]);
        let config = no_delay_config(2);

        let result = Fetcher::new(&source, &config).fetch_station(&station("XJ")).await;

        assert!(!result.success);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(result.metadata.error.unwrap().contains("Empty response body"));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let source = FakeSource::default();
        let config = no_delay_config(3);

        let result = Fetcher::new(&source, &config).fetch_station(&station("ZZ")).await;

        assert!(!result.success);
        assert!(result.values.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn page_without_readings_fails_without_retry() {
        let source = FakeSource::default().with_page("XJ", "<html><body>Manteniment</body></html>");
        let config = no_delay_config(3);

        let result = Fetcher::new(&source, &config).fetch_station(&station("XJ")).await;

        assert!(!result.success);
        assert!(result.values.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let source = FakeSource::default().with_page("XJ", PAGE).with_page("DJ", PAGE);
        let config = no_delay_config(1);
        let stations = vec![station("XJ"), station("VK"), station("DJ")];

        let snapshot = Fetcher::new(&source, &config).run(&stations).await;

        assert_eq!(snapshot.metadata.stations_count, 3);
        assert_eq!(snapshot.metadata.source, config.name);
        assert_eq!(snapshot.success_count(), 2);
        assert_eq!(snapshot.failed_codes(), vec!["VK"]);

        log_summary(&snapshot, &stations);
    }
}
