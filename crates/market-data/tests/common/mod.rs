//! Scripted providers for exercising the manager without a network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::Instant;
use watchlist_market_data::{
    Capability, FetchRequest, FetchResult, MarketDataError, MarketDataProvider, Payload,
    ProviderCapabilities, RateLimit, RealtimeQuote, StockBasicInfo,
};

/// What a scripted provider does on one call.
#[derive(Clone, Debug)]
pub enum Step {
    Succeed,
    Fail(MarketDataError),
    /// Sleep before succeeding.
    Hang(Duration),
}

/// Shared record of which provider was called, in order.
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub struct ScriptedProvider {
    id: &'static str,
    priority: u8,
    rate_limit: RateLimit,
    /// Consumed front to back; the last step repeats forever.
    script: Mutex<VecDeque<Step>>,
    log: CallLog,
    call_times: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(id: &'static str, priority: u8, script: Vec<Step>, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            id,
            priority,
            rate_limit: RateLimit::unlimited(),
            script: Mutex::new(script.into()),
            log: Arc::clone(log),
            call_times: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn with_rate_limit(
        id: &'static str,
        rate_limit: RateLimit,
        script: Vec<Step>,
        log: &CallLog,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            priority: 1,
            rate_limit,
            script: Mutex::new(script.into()),
            log: Arc::clone(log),
            call_times: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.call_times.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or(Step::Succeed)
        }
    }
}

pub fn payload_for(request: &FetchRequest, provider: &str) -> Payload {
    match request.capability() {
        Capability::BasicInfo => Payload::BasicInfo(StockBasicInfo::new(request.symbol(), provider)),
        Capability::DailyBars => Payload::DailyBars(Vec::new()),
        Capability::RealtimeQuote => {
            Payload::RealtimeQuote(RealtimeQuote::new(request.symbol(), Decimal::ONE, Utc::now()))
        }
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            capabilities: &Capability::ALL,
            supports_paging: false,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        self.rate_limit.clone()
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, MarketDataError> {
        self.log.lock().unwrap().push(self.id);
        self.call_times.lock().unwrap().push(Instant::now());

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let step = self.next_step();
        let outcome = match step {
            Step::Succeed => Ok(FetchResult::new(self.id, payload_for(request, self.id))),
            Step::Fail(error) => Err(error),
            Step::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(FetchResult::new(self.id, payload_for(request, self.id)))
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

pub fn server_error(provider: &str) -> MarketDataError {
    MarketDataError::from_status(provider, 503, "service unavailable")
}

pub fn unauthorized(provider: &str) -> MarketDataError {
    MarketDataError::from_status(provider, 401, "invalid token")
}

/// Largest number of calls falling inside any window of `span` starting at a call.
pub fn max_calls_in_any_window(times: &[Instant], span: Duration) -> usize {
    let mut sorted = times.to_vec();
    sorted.sort();
    sorted
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            sorted[i..]
                .iter()
                .take_while(|&&t| t.duration_since(start) < span)
                .count()
        })
        .max()
        .unwrap_or(0)
}

/// Upcast scripted providers for registration with the manager.
pub fn registered(providers: &[&Arc<ScriptedProvider>]) -> Vec<Arc<dyn MarketDataProvider>> {
    providers
        .iter()
        .map(|&provider| {
            let provider: Arc<dyn MarketDataProvider> = provider.clone();
            provider
        })
        .collect()
}
