use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use pettrak_client::{ClientError, CloudClient, Credential, Session};
use pettrak_coordinator::{
    Availability, BackoffPolicy, ChannelSubscriber, FetchResult, PermanentReason, PetRegistry,
    PetUpdate, UnavailableReason,
};
use pettrak_types::{
    EventCategory, MetricKey, MetricValue, Pet, PetId, RawEvent, RawReading,
};

const FLUFFY: PetId = PetId(7);
const REX: PetId = PetId(8);

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 8, 12, 0, 0).unwrap()
}

fn fluffy() -> Pet {
    Pet::new(FLUFFY, "Fluffy")
}

fn rex() -> Pet {
    Pet::new(REX, "Rex")
}

fn credential() -> Credential {
    Credential::new("owner@example.com", "hunter2")
}

fn fluffy_readings() -> Vec<RawReading> {
    vec![
        RawReading::new(now() - chrono::Duration::hours(30), 120.0),
        RawReading::new(now() - chrono::Duration::hours(20), 150.0),
        RawReading::new(now() - chrono::Duration::hours(10), 90.0),
    ]
}

/// Scripted cloud: readings calls fail with queued errors first, then succeed.
#[derive(Default)]
struct MockCloud {
    logins: AtomicU32,
    reading_calls: AtomicU32,
    reject_login: AtomicBool,
    /// When set, only this password logs in.
    password: Option<&'static str>,
    failures: Mutex<VecDeque<ClientError>>,
    readings: Vec<RawReading>,
    events: Vec<RawEvent>,
    pets: Vec<Pet>,
    delay: Option<Duration>,
}

impl MockCloud {
    fn new() -> Self {
        Self {
            readings: fluffy_readings(),
            events: vec![RawEvent::new(
                now() - chrono::Duration::hours(2),
                EventCategory::Feeding,
            )],
            ..Default::default()
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn fail_next(&self, err: ClientError) {
        self.failures.lock().unwrap().push_back(err);
    }

    fn logins(&self) -> u32 {
        self.logins.load(Ordering::SeqCst)
    }

    fn reading_calls(&self) -> u32 {
        self.reading_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloudClient for MockCloud {
    async fn login(&self, credential: &Credential) -> Result<Session, ClientError> {
        let wrong_password = self
            .password
            .is_some_and(|password| credential.password != password);
        if wrong_password || self.reject_login.load(Ordering::SeqCst) {
            return Err(ClientError::Auth("bad password".to_string()));
        }
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Session::new(format!("token-{}", n), Utc::now()))
    }

    async fn list_pets(&self, _session: &Session) -> Result<Vec<Pet>, ClientError> {
        Ok(self.pets.clone())
    }

    async fn fetch_readings(
        &self,
        _session: &Session,
        _pet: &Pet,
        _since: DateTime<Utc>,
    ) -> Result<Vec<RawReading>, ClientError> {
        self.reading_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.failures.lock().unwrap().pop_front();
        match scripted {
            Some(err) => Err(err),
            None => Ok(self.readings.clone()),
        }
    }

    async fn fetch_events(
        &self,
        _session: &Session,
        _pet: &Pet,
        _since: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, ClientError> {
        Ok(self.events.clone())
    }
}

fn registry(cloud: Arc<MockCloud>) -> (PetRegistry, mpsc::Receiver<PetUpdate>) {
    let (subscriber, rx) = ChannelSubscriber::channel(16);
    let registry = PetRegistry::builder(cloud)
        .backoff(BackoffPolicy::new(
            Duration::from_secs(60),
            Duration::from_secs(600),
        ))
        .call_timeout(Duration::from_secs(30))
        .subscriber(Arc::new(subscriber))
        .clock(now)
        .build();
    (registry, rx)
}

async fn next_snapshot(rx: &mut mpsc::Receiver<PetUpdate>) -> (Pet, Arc<pettrak_types::Snapshot>) {
    match rx.recv().await {
        Some(PetUpdate::Snapshot { pet, snapshot }) => (pet, snapshot),
        other => panic!("expected a snapshot, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn first_cycle_publishes_snapshot() {
    let cloud = Arc::new(MockCloud::new());
    let (registry, mut rx) = registry(cloud.clone());

    let handle = registry.register_pet(credential(), fluffy());
    let (pet, snapshot) = next_snapshot(&mut rx).await;

    assert_eq!(pet, fluffy());
    assert_eq!(snapshot.readings_in_window, 3);
    assert_eq!(snapshot.average_glucose, Some(120.0));
    assert_eq!(snapshot.glucose_level(), Some(90.0));
    assert_eq!(snapshot.count(EventCategory::Feeding), 1);

    assert_eq!(
        registry.metric(FLUFFY, MetricKey::GlucoseLevel),
        Some(MetricValue::Number(90.0))
    );
    assert_eq!(handle.status().consecutive_failures, 0);
    assert_eq!(cloud.logins(), 1);
}

#[tokio::test(start_paused = true)]
async fn auth_expired_relogs_in_once_and_retries() {
    let cloud = Arc::new(MockCloud::new());
    cloud.fail_next(ClientError::AuthExpired);
    let (registry, mut rx) = registry(cloud.clone());

    registry.register_pet(credential(), fluffy());
    let (_, snapshot) = next_snapshot(&mut rx).await;

    assert_eq!(snapshot.glucose_level(), Some(90.0));
    assert_eq!(cloud.logins(), 2);
    assert_eq!(cloud.reading_calls(), 2);
    assert_eq!(registry.status(FLUFFY).unwrap().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_then_reset() {
    let cloud = Arc::new(MockCloud::new());
    cloud.fail_next(ClientError::Server("API returned status 503".to_string()));
    cloud.fail_next(ClientError::Timeout);
    let (registry, mut rx) = registry(cloud.clone());

    let start = tokio::time::Instant::now();
    registry.register_pet(credential(), fluffy());
    next_snapshot(&mut rx).await;

    // Fails at 0s (next in 120s), fails at 120s (next in 240s), succeeds at 360s.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(360), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(361), "{:?}", elapsed);
    assert_eq!(cloud.reading_calls(), 3);

    let status = registry.status(FLUFFY).unwrap();
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.interval, Duration::from_secs(60));
    assert!(!status.stale);
}

#[tokio::test(start_paused = true)]
async fn never_fetched_pet_reports_nothing() {
    let cloud = Arc::new(MockCloud::new());
    cloud.fail_next(ClientError::Network("connection refused".to_string()));
    let (registry, _rx) = registry(cloud.clone());

    registry.register_pet(credential(), fluffy());
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(registry.get_snapshot(FLUFFY), None);
    assert_eq!(registry.metric(FLUFFY, MetricKey::ReadingsLast7Days), None);

    let status = registry.status(FLUFFY).unwrap();
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(status.interval, Duration::from_secs(120));
    assert!(!status.stale);
    assert!(status.last_error.unwrap().contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn schema_failure_keeps_stale_snapshot() {
    let cloud = Arc::new(MockCloud::new());
    let (registry, mut rx) = registry(cloud.clone());

    registry.register_pet(credential(), fluffy());
    next_snapshot(&mut rx).await;

    cloud.fail_next(ClientError::Schema("BloodGlucose[0] has no valid GlucoseLevel".into()));
    tokio::time::sleep(Duration::from_secs(61)).await;

    let status = registry.status(FLUFFY).unwrap();
    assert!(status.stale);
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(status.interval, Duration::from_secs(120));
    assert_eq!(
        registry.get_snapshot(FLUFFY).unwrap().glucose_level(),
        Some(90.0)
    );
    assert!(status.availability.is_active());
}

#[tokio::test(start_paused = true)]
async fn removed_pet_stops_polling() {
    let cloud = Arc::new(MockCloud::new());
    cloud.fail_next(ClientError::PetRemoved(FLUFFY));
    let (registry, mut rx) = registry(cloud.clone());

    registry.register_pet(credential(), fluffy());

    match rx.recv().await {
        Some(PetUpdate::Unavailable { pet, reason }) => {
            assert_eq!(pet, fluffy());
            assert_eq!(reason, UnavailableReason::PetRemoved);
        }
        other => panic!("expected unavailable, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(cloud.reading_calls(), 1);
    assert!(!registry.request_refresh(FLUFFY));
    assert_eq!(
        registry.status(FLUFFY).unwrap().availability,
        Availability::Unavailable(UnavailableReason::PetRemoved)
    );
    assert_eq!(registry.get_snapshot(FLUFFY), None);
}

#[tokio::test(start_paused = true)]
async fn refresh_during_cycle_is_coalesced() {
    let cloud = Arc::new(MockCloud::new().with_delay(Duration::from_secs(10)));
    let (registry, mut rx) = registry(cloud.clone());

    let start = tokio::time::Instant::now();
    registry.register_pet(credential(), fluffy());
    while cloud.reading_calls() == 0 {
        tokio::task::yield_now().await;
    }

    assert!(!registry.request_refresh(FLUFFY));
    assert!(!registry.request_refresh(FLUFFY));
    next_snapshot(&mut rx).await;
    assert_eq!(cloud.reading_calls(), 1);

    assert!(registry.request_refresh(FLUFFY));
    next_snapshot(&mut rx).await;
    assert_eq!(cloud.reading_calls(), 2);
    assert!(start.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn pets_on_one_account_share_a_login() {
    let cloud = Arc::new(MockCloud::new());
    let (registry, mut rx) = registry(cloud.clone());

    registry.register_pet(credential(), fluffy());
    registry.register_pet(credential(), rex());
    next_snapshot(&mut rx).await;
    next_snapshot(&mut rx).await;

    assert_eq!(cloud.logins(), 1);
    assert_eq!(registry.pets(), vec![fluffy(), rex()]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_expiry_relogs_in_once() {
    let cloud = Arc::new(MockCloud::new().with_delay(Duration::from_secs(1)));
    cloud.fail_next(ClientError::AuthExpired);
    cloud.fail_next(ClientError::AuthExpired);
    let (registry, mut rx) = registry(cloud.clone());

    registry.register_pet(credential(), fluffy());
    registry.register_pet(credential(), rex());
    next_snapshot(&mut rx).await;
    next_snapshot(&mut rx).await;

    // One initial login plus one shared re-login.
    assert_eq!(cloud.logins(), 2);
    assert_eq!(cloud.reading_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn login_failure_keeps_polling() {
    let cloud = Arc::new(MockCloud::new());
    cloud.reject_login.store(true, Ordering::SeqCst);
    let (registry, mut rx) = registry(cloud.clone());

    registry.register_pet(credential(), fluffy());
    tokio::time::sleep(Duration::from_secs(1)).await;

    let status = registry.status(FLUFFY).unwrap();
    assert_eq!(status.consecutive_failures, 1);
    assert!(status.last_error.unwrap().contains("login failed"));
    assert!(status.availability.is_active());

    cloud.reject_login.store(false, Ordering::SeqCst);
    next_snapshot(&mut rx).await;
    assert_eq!(cloud.logins(), 1);
}

#[tokio::test(start_paused = true)]
async fn deregister_discards_state() {
    let cloud = Arc::new(MockCloud::new());
    let (registry, mut rx) = registry(cloud.clone());

    let handle = registry.register_pet(credential(), fluffy());
    next_snapshot(&mut rx).await;

    assert!(registry.deregister_pet(FLUFFY));
    assert_eq!(registry.get_snapshot(FLUFFY), None);
    assert_eq!(registry.status(FLUFFY), None);
    assert!(registry.pets().is_empty());
    assert!(!registry.request_refresh(FLUFFY));
    assert!(!registry.deregister_pet(FLUFFY));

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(cloud.reading_calls(), 1);
    // The old handle still reads its last state.
    assert_eq!(handle.pet(), &fluffy());
}

#[tokio::test(start_paused = true)]
async fn registering_twice_returns_existing_pet() {
    let cloud = Arc::new(MockCloud::new());
    let (registry, mut rx) = registry(cloud.clone());

    registry.register_pet(credential(), fluffy());
    registry.register_pet(credential(), fluffy());
    next_snapshot(&mut rx).await;

    assert_eq!(registry.pets().len(), 1);
    assert_eq!(cloud.reading_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn discover_pets_reuses_session_for_registration() {
    let cloud = Arc::new(MockCloud {
        pets: vec![fluffy(), rex()],
        ..MockCloud::new()
    });
    let (registry, mut rx) = registry(cloud.clone());

    let pets = registry.discover_pets(&credential()).await.unwrap();
    assert_eq!(pets, vec![fluffy(), rex()]);

    registry.register_pet(credential(), pets[0].clone());
    next_snapshot(&mut rx).await;
    assert_eq!(cloud.logins(), 1);
}

#[tokio::test(start_paused = true)]
async fn discover_pets_rejects_bad_password() {
    let cloud = Arc::new(MockCloud::new());
    cloud.reject_login.store(true, Ordering::SeqCst);
    let (registry, _rx) = registry(cloud.clone());

    let err = registry.discover_pets(&credential()).await.unwrap_err();
    assert!(matches!(err, ClientError::Auth(_)));
}

#[tokio::test(start_paused = true)]
async fn discover_pets_accepts_corrected_password() {
    let cloud = Arc::new(MockCloud {
        pets: vec![fluffy()],
        password: Some("hunter2"),
        ..MockCloud::new()
    });
    let (registry, mut rx) = registry(cloud.clone());

    let typo = Credential::new("owner@example.com", "hunter3");
    let err = registry.discover_pets(&typo).await.unwrap_err();
    assert!(matches!(err, ClientError::Auth(_)));

    let pets = registry.discover_pets(&credential()).await.unwrap();
    assert_eq!(pets, vec![fluffy()]);
    assert_eq!(cloud.logins(), 1);

    registry.register_pet(credential(), fluffy());
    next_snapshot(&mut rx).await;
    assert_eq!(cloud.logins(), 1);
}

#[tokio::test(start_paused = true)]
async fn registering_with_new_password_logs_in_again() {
    let cloud = Arc::new(MockCloud::new());
    let (registry, mut rx) = registry(cloud.clone());

    registry.register_pet(credential(), fluffy());
    next_snapshot(&mut rx).await;

    registry.register_pet(Credential::new("owner@example.com", "changed"), rex());
    next_snapshot(&mut rx).await;
    assert_eq!(cloud.logins(), 2);
}

#[tokio::test(start_paused = true)]
async fn hanging_call_times_out() {
    let cloud = Arc::new(MockCloud::new().with_delay(Duration::from_secs(45)));
    let (registry, _rx) = registry(cloud.clone());

    registry.register_pet(credential(), fluffy());
    tokio::time::sleep(Duration::from_secs(31)).await;

    let status = registry.status(FLUFFY).unwrap();
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(status.interval, Duration::from_secs(120));
    assert!(status.last_error.unwrap().contains("timed out"));
    assert_eq!(cloud.reading_calls(), 1);
    assert_eq!(registry.get_snapshot(FLUFFY), None);
}

#[tokio::test(start_paused = true)]
async fn poll_now_finding_removed_pet_stops_polling() {
    let cloud = Arc::new(MockCloud::new());
    let (registry, mut rx) = registry(cloud.clone());

    let handle = registry.register_pet(credential(), fluffy());
    next_snapshot(&mut rx).await;

    cloud.fail_next(ClientError::PetRemoved(FLUFFY));
    assert_eq!(
        handle.poll_now().await,
        Some(FetchResult::PermanentFailure(PermanentReason::PetRemoved))
    );
    assert!(matches!(
        rx.recv().await,
        Some(PetUpdate::Unavailable {
            reason: UnavailableReason::PetRemoved,
            ..
        })
    ));

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(cloud.reading_calls(), 2);
    assert!(rx.try_recv().is_err());
    assert_eq!(handle.poll_now().await, None);
    assert_eq!(cloud.reading_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn poll_now_reports_cycle_outcome() {
    let cloud = Arc::new(MockCloud::new());
    let (registry, mut rx) = registry(cloud.clone());

    let handle = registry.register_pet(credential(), fluffy());
    next_snapshot(&mut rx).await;

    match handle.poll_now().await {
        Some(FetchResult::Success(snapshot)) => {
            assert_eq!(snapshot.glucose_level(), Some(90.0))
        }
        other => panic!("expected success, got {:?}", other),
    }

    cloud.fail_next(ClientError::Timeout);
    assert!(matches!(
        handle.poll_now().await,
        Some(FetchResult::TransientFailure(_))
    ));
    assert_eq!(handle.status().consecutive_failures, 1);
}
