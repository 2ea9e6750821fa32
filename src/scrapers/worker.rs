use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::browser_options;
use crate::error::TierError;
use crate::models::Source;
use crate::scrapers::browser::{BrowserOptions, LiveBrowserScraper};
use crate::scrapers::synthetic;
use crate::scrapers::traits::OfferTier;
use crate::scrapers::types::{RawOffer, SearchRequest};

/// The single JSON line a worker process writes to stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPayload {
    pub source: Source,
    /// True when the worker could not extract the page and generated records instead
    pub fallback: bool,
    pub offers: Vec<RawOffer>,
}

/// Turns the outcome of a browser run into the payload the worker reports.
///
/// Extraction errors never surface as a process failure: the worker answers with
/// generated records flagged as estimated. Zero cards without an error stays empty.
pub fn build_payload<R: Rng>(
    outcome: Result<Vec<RawOffer>>,
    request: &SearchRequest,
    rng: &mut R,
) -> WorkerPayload {
    match outcome {
        Ok(mut offers) => {
            offers.truncate(request.max_offers);
            WorkerPayload {
                source: Source::Live,
                fallback: false,
                offers,
            }
        }
        Err(e) => {
            warn!("Live extraction failed, answering with generated records: {:#}", e);
            let offers = synthetic::generate(request, rng)
                .into_iter()
                .map(|mut offer| {
                    offer.source = Some(Source::Live.to_string());
                    offer.estimated.record = true;
                    offer
                })
                .collect();
            WorkerPayload {
                source: Source::Live,
                fallback: true,
                offers,
            }
        }
    }
}

/// Runs one browser scrape for `request` and packages the result. Blocking.
pub fn run_worker(request: &SearchRequest, options: BrowserOptions) -> WorkerPayload {
    let outcome = LiveBrowserScraper::launch(options).and_then(|scraper| scraper.scrape(request));
    if let Ok(offers) = &outcome {
        info!("✅ Extracted {} offers from live page", offers.len());
    }
    build_payload(outcome, request, &mut rand::thread_rng())
}

/// Entry point of the `worker` subcommand.
///
/// Every failure past argument parsing still produces a payload, so the process can always
/// answer with one line and exit 0.
pub async fn run_worker_process(
    request: &SearchRequest,
    headless: bool,
    use_proxy: bool,
) -> WorkerPayload {
    let options = match browser_options(headless, use_proxy) {
        Ok(options) => options,
        Err(e) => return build_payload(Err(e), request, &mut rand::thread_rng()),
    };

    let owned = request.clone();
    match tokio::task::spawn_blocking(move || run_worker(&owned, options)).await {
        Ok(payload) => payload,
        Err(e) => {
            let err = anyhow::Error::new(e).context("Worker thread panicked");
            build_payload(Err(err), request, &mut rand::thread_rng())
        }
    }
}

/// Writes the payload as exactly one line.
pub fn emit_payload<W: Write>(payload: &WorkerPayload, out: &mut W) -> Result<()> {
    serde_json::to_writer(&mut *out, payload).context("Failed to serialize worker payload")?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Parses worker stdout, which must hold exactly one non-empty line.
pub fn parse_worker_output(stdout: &str) -> Result<WorkerPayload, TierError> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    let line = lines
        .next()
        .ok_or_else(|| TierError::Parse("worker produced no output".into()))?;
    if lines.next().is_some() {
        return Err(TierError::Parse(
            "worker produced more than one output line".into(),
        ));
    }

    Ok(serde_json::from_str(line)?)
}

/// Positional arguments of the `worker` subcommand, in order
pub fn worker_args(request: &SearchRequest, headless: bool, use_proxy: bool) -> Vec<String> {
    vec![
        request.destination.raw.clone(),
        request.max_offers.to_string(),
        headless.to_string(),
        use_proxy.to_string(),
        request.stay.check_in.to_string(),
        request.stay.check_out.to_string(),
        request.party.adults.to_string(),
        request.party.rooms.to_string(),
        request.currency.clone(),
    ]
}

/// Kills whatever is left of a worker's process group when dropped, Chrome included.
struct ProcessGroup(Option<u32>);

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.0.and_then(|id| libc::pid_t::try_from(id).ok()) {
            // SAFETY: killpg takes plain integers and touches no memory
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
}

/// Live tier: one isolated worker process per call.
///
/// The worker leads its own process group. Dropping the fetch future, as a coordinator
/// timeout does, kills the whole group so the browser it launched goes with it.
pub struct LiveScrapeTier {
    program: PathBuf,
    leading_args: Vec<String>,
    headless: bool,
    use_proxy: bool,
}

impl LiveScrapeTier {
    /// Spawns `program worker <args...>`
    pub fn new(program: PathBuf, headless: bool, use_proxy: bool) -> Self {
        Self::with_command(program, vec!["worker".to_string()], headless, use_proxy)
    }

    pub fn with_command(
        program: PathBuf,
        leading_args: Vec<String>,
        headless: bool,
        use_proxy: bool,
    ) -> Self {
        Self {
            program,
            leading_args,
            headless,
            use_proxy,
        }
    }
}

#[async_trait]
impl OfferTier for LiveScrapeTier {
    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<RawOffer>, TierError> {
        info!(
            "🌐 Starting live worker for {} ({})",
            request.destination.raw,
            self.program.display()
        );

        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(worker_args(request, self.headless, self.use_proxy))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn()?;
        let _group = ProcessGroup(child.id());
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(TierError::Transport(format!(
                "worker exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let payload = parse_worker_output(&stdout)?;
        if payload.fallback {
            warn!("Live worker answered with generated records");
        }
        debug!("Live worker returned {} records", payload.offers.len());
        Ok(payload.offers)
    }

    fn source(&self) -> Source {
        Source::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DestinationQuery;
    use anyhow::anyhow;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    fn request(max: usize) -> SearchRequest {
        SearchRequest::new(DestinationQuery::parse("Paris, France").unwrap())
            .with_max_offers(Some(max))
    }

    #[test]
    fn failed_extraction_falls_back_to_flagged_records() {
        let mut rng = StdRng::seed_from_u64(3);
        let payload = build_payload(Err(anyhow!("selector timeout")), &request(4), &mut rng);

        assert!(payload.fallback);
        assert_eq!(payload.source, Source::Live);
        assert_eq!(payload.offers.len(), 4);
        assert!(payload.offers.iter().all(|o| o.estimated.record));
        assert!(payload
            .offers
            .iter()
            .all(|o| o.source.as_deref() == Some("live")));
    }

    #[test]
    fn zero_cards_stays_empty() {
        let mut rng = StdRng::seed_from_u64(3);
        let payload = build_payload(Ok(vec![]), &request(4), &mut rng);
        assert!(!payload.fallback);
        assert!(payload.offers.is_empty());
    }

    #[test]
    fn emitted_payload_is_one_parseable_line() {
        let mut rng = StdRng::seed_from_u64(5);
        let payload = build_payload(Err(anyhow!("boom")), &request(2), &mut rng);

        let mut out = Vec::new();
        emit_payload(&payload, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches('\n').count(), 1);

        let parsed = parse_worker_output(&text).unwrap();
        assert!(parsed.fallback);
        assert_eq!(parsed.offers.len(), 2);
    }

    #[test]
    fn rejects_missing_or_extra_lines() {
        assert!(matches!(parse_worker_output(""), Err(TierError::Parse(_))));
        assert!(matches!(
            parse_worker_output("{\"source\":\"live\",\"fallback\":false,\"offers\":[]}\nnoise\n"),
            Err(TierError::Parse(_))
        ));
        assert!(matches!(
            parse_worker_output("Launching Chrome..."),
            Err(TierError::Parse(_))
        ));
    }

    #[test]
    fn args_follow_positional_order() {
        let args = worker_args(&request(7), true, false);
        assert_eq!(args[0], "Paris, France");
        assert_eq!(args[1], "7");
        assert_eq!(args[2], "true");
        assert_eq!(args[3], "false");
        assert_eq!(args[6], "2");
        assert_eq!(args[7], "1");
        assert_eq!(args[8], "USD");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reads_payload_from_child_process() {
        let line = r#"{"source":"live","fallback":false,"offers":[{"name":"Hotel Lutetia","price":410}]}"#;
        let tier = LiveScrapeTier::with_command(
            PathBuf::from("sh"),
            vec!["-c".into(), format!("echo '{line}'"), "sh".into()],
            true,
            false,
        );
        let offers = tier.fetch(&request(3)).await.unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].name.as_deref(), Some("Hotel Lutetia"));
    }

    #[tokio::test]
    async fn bad_browser_settings_still_yield_a_payload() {
        std::env::set_var("LODGING_SETTLE_SECS", "abc");
        let payload = run_worker_process(&request(3), true, false).await;
        std::env::remove_var("LODGING_SETTLE_SECS");

        let mut out = Vec::new();
        emit_payload(&payload, &mut out).unwrap();
        let parsed = parse_worker_output(&String::from_utf8(out).unwrap()).unwrap();
        assert!(parsed.fallback);
        assert_eq!(parsed.offers.len(), 3);
        assert!(parsed.offers.iter().all(|o| o.estimated.record));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropped_fetch_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let tier = LiveScrapeTier::with_command(
            PathBuf::from("sh"),
            vec![
                "-c".into(),
                r#"sleep 30 & echo $! > "$0"; wait"#.into(),
                pid_file.display().to_string(),
            ],
            true,
            false,
        );

        let req = request(1);
        let fetch = tier.fetch(&req);
        assert!(tokio::time::timeout(Duration::from_millis(500), fetch).await.is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let stat = PathBuf::from(format!("/proc/{pid}/stat"));
        let mut gone = false;
        for _ in 0..40 {
            // A killed process may linger as a zombie until it is reaped
            gone = match std::fs::read_to_string(&stat) {
                Err(_) => true,
                Ok(line) => line
                    .rsplit(')')
                    .next()
                    .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            };
            if gone {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "grandchild {pid} survived the timeout");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn garbage_output_is_a_parse_error() {
        let tier = LiveScrapeTier::with_command(
            PathBuf::from("sh"),
            vec!["-c".into(), "echo 'not json'".into(), "sh".into()],
            true,
            false,
        );
        assert!(matches!(
            tier.fetch(&request(3)).await,
            Err(TierError::Parse(_))
        ));
    }
}
