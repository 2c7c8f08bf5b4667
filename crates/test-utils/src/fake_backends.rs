use std::collections::{HashMap, VecDeque};
use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tradesight::backends::{
    AlertData, AnomalyAssessment, AnomalyModel, BackendError, BackendFuture, Backends, CaseQuery,
    CommunicationQuery, ReasoningRequest, ReasoningResponse, ReasoningService, SimilaritySearch,
    TradeDataSource, TradeFingerprint,
};
use tradesight::context::{
    ClientProfile, CommunicationSignal, MarketData, SimilarCase, TradeRecord,
};

/// Everything one alert id resolves to.
#[derive(Debug, Clone)]
pub struct AlertScenario {
    pub trades: Vec<TradeRecord>,
    pub client: ClientProfile,
    pub market: MarketData,
    pub assessment: Option<AnomalyAssessment>,
    pub similar_cases: Vec<SimilarCase>,
    pub communications: Vec<CommunicationSignal>,
    pub reasoning: Option<ReasoningResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    TradeData,
    AnomalyModel,
    CaseSearch,
    CommunicationSearch,
    Reasoning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Unavailable,
    NotFound,
    Rejected,
    /// Never answers.
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    /// Consumed one per call before `always` is consulted.
    next: VecDeque<Fault>,
    always: Option<Fault>,
    latency: Option<Duration>,
    calls: usize,
}

/// In-memory implementation of every backend trait with scriptable
/// failures, latency and call counting.
#[derive(Debug, Default)]
pub struct ScriptedBackends {
    alerts: HashMap<String, AlertScenario>,
    by_fingerprint: HashMap<TradeFingerprint, String>,
    scripts: Mutex<HashMap<Endpoint, Script>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alert(mut self, alert_id: &str, scenario: AlertScenario) -> Self {
        if !scenario.trades.is_empty() {
            self.by_fingerprint
                .insert(TradeFingerprint::of(&scenario.trades), alert_id.to_string());
        }
        self.alerts.insert(alert_id.to_string(), scenario);
        self
    }

    /// The next `times` calls to `endpoint` fail with `fault`.
    pub fn fail_next(self, endpoint: Endpoint, fault: Fault, times: usize) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(endpoint).or_default();
            script.next.extend(std::iter::repeat_n(fault, times));
        }
        self
    }

    /// Every call to `endpoint` fails with `fault`.
    pub fn fail_always(self, endpoint: Endpoint, fault: Fault) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .always = Some(fault);
        self
    }

    pub fn with_latency(self, endpoint: Endpoint, latency: Duration) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .latency = Some(latency);
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Shared handle plus the [`Backends`] bundle that points at it.
    pub fn into_backends(self) -> (Arc<Self>, Backends) {
        let shared = Arc::new(self);
        let backends = Backends::from_shared(Arc::clone(&shared));
        (shared, backends)
    }

    /// Number of calls made to `endpoint` so far.
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.scripts
            .lock()
            .unwrap()
            .get(&endpoint)
            .map(|s| s.calls)
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.scripts.lock().unwrap().values().map(|s| s.calls).sum()
    }

    /// Highest number of backend calls observed in progress at once.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Count the call, apply latency and any scripted fault.
    async fn enter(&self, endpoint: Endpoint) -> Result<(), BackendError> {
        let (latency, fault) = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(endpoint).or_default();
            script.calls += 1;
            let fault = script.next.pop_front().or(script.always);
            (script.latency, fault)
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }

        match fault {
            None => Ok(()),
            Some(Fault::Unavailable) => Err(BackendError::Unavailable(format!(
                "scripted outage of {endpoint:?}"
            ))),
            Some(Fault::NotFound) => {
                Err(BackendError::NotFound(format!("scripted miss on {endpoint:?}")))
            }
            Some(Fault::Rejected) => Err(BackendError::Rejected(format!(
                "scripted rejection by {endpoint:?}"
            ))),
            Some(Fault::Hang) => pending().await,
        }
    }

    fn scenario_for_trades(&self, trades: &[TradeRecord]) -> Option<&AlertScenario> {
        let id = self.by_fingerprint.get(&TradeFingerprint::of(trades))?;
        self.alerts.get(id)
    }
}

impl TradeDataSource for ScriptedBackends {
    fn fetch_alert_data<'a>(&'a self, alert_id: &'a str) -> BackendFuture<'a, AlertData> {
        Box::pin(async move {
            self.enter(Endpoint::TradeData).await?;
            let s = self
                .alerts
                .get(alert_id)
                .ok_or_else(|| BackendError::NotFound(format!("alert '{alert_id}'")))?;
            Ok(AlertData {
                trade_records: s.trades.clone(),
                client_profile: s.client.clone(),
                market_data: s.market.clone(),
            })
        })
    }
}

impl AnomalyModel for ScriptedBackends {
    fn score<'a>(&'a self, trades: &'a [TradeRecord]) -> BackendFuture<'a, AnomalyAssessment> {
        Box::pin(async move {
            self.enter(Endpoint::AnomalyModel).await?;
            self.scenario_for_trades(trades)
                .and_then(|s| s.assessment.clone())
                .ok_or_else(|| BackendError::NotFound("no scripted assessment".to_string()))
        })
    }
}

impl SimilaritySearch for ScriptedBackends {
    fn find_similar_cases<'a>(
        &'a self,
        query: &'a CaseQuery,
    ) -> BackendFuture<'a, Vec<SimilarCase>> {
        Box::pin(async move {
            self.enter(Endpoint::CaseSearch).await?;
            let mut cases = self
                .by_fingerprint
                .get(&query.fingerprint)
                .and_then(|id| self.alerts.get(id))
                .map(|s| s.similar_cases.clone())
                .unwrap_or_default();
            cases.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
            cases.truncate(query.limit);
            Ok(cases)
        })
    }

    fn search_communications<'a>(
        &'a self,
        query: &'a CommunicationQuery,
    ) -> BackendFuture<'a, Vec<CommunicationSignal>> {
        Box::pin(async move {
            self.enter(Endpoint::CommunicationSearch).await?;
            let mut hits: Vec<CommunicationSignal> = self
                .alerts
                .values()
                .filter(|s| s.client.client_id == query.client_id)
                .flat_map(|s| s.communications.iter().cloned())
                .filter(|c| c.timestamp >= query.window_start && c.timestamp <= query.window_end)
                .collect();
            hits.truncate(query.limit);
            Ok(hits)
        })
    }
}

impl ReasoningService for ScriptedBackends {
    fn synthesize<'a>(
        &'a self,
        request: ReasoningRequest<'a>,
    ) -> BackendFuture<'a, ReasoningResponse> {
        Box::pin(async move {
            self.enter(Endpoint::Reasoning).await?;
            let alert_id = request.context.alert_id();
            self.alerts
                .get(alert_id)
                .and_then(|s| s.reasoning.clone())
                .ok_or_else(|| {
                    BackendError::Rejected(format!("no scripted reasoning for '{alert_id}'"))
                })
        })
    }
}
