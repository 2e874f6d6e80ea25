use async_trait::async_trait;
use busrpc::{
    bus::{local::handler_fn, Failure, Message, MessageCodec},
    codec::Envelope,
    descriptor, enumeration, record, service, Bus, BusError, ClientConfig, CoercionError,
    LocalBus, ReplyEnvelope, RequestEnvelope, ServiceError, ServiceResult, ServiceServer, Value,
};
use chrono::{DateTime, Utc};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanOperation {
    a: bool,
    b: Option<bool>,
}

record!(BooleanOperation { a: bool, b: Option<bool> });

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedBooleanOperation {
    operation: BooleanOperation,
    result: bool,
}

record!(ComputedBooleanOperation {
    operation: BooleanOperation,
    result: bool,
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gate {
    And,
    Or,
}

enumeration!(Gate { And, Or });

service! {
    pub trait MathService for MathServiceClient {
        fn calculate_not(a: bool) -> bool;
        fn calculate_and(a: bool, b: bool) -> bool;
        fn calculate_gate(gate: Gate, a: bool, b: bool) -> bool;
        /// Does nothing but count.
        fn calculate_completable() -> ();
        fn calculate_merge_to_list(a: bool, b: bool) -> Vec<bool>;
        fn calculate_list_or(values: Vec<bool>) -> bool;
        fn calculate_maybe(should_return: bool) -> Option<bool>;
        fn calculate_custom_record_or(operation: BooleanOperation) -> ComputedBooleanOperation;

        #[local]
        /// Computed in-process.
        fn calculate_xor(&self, a: bool, b: bool) -> bool {
            a != b
        }
    }
}

service! {
    pub trait ClockService for ClockServiceClient {
        #[timeout(5)]
        fn identify(id: Uuid) -> Uuid;
        fn later(at: DateTime<Utc>, seconds: i64) -> DateTime<Utc>;
        fn stall(millis: i64) -> ();
        fn reversed(ids: Vec<Uuid>) -> Vec<Uuid>;
        fn earliest(at: Vec<DateTime<Utc>>) -> Option<DateTime<Utc>>;
        fn owners(ids: BTreeMap<String, Uuid>, id: Uuid) -> Vec<String>;
    }
}

#[derive(Default)]
struct Calculator {
    completions: AtomicUsize,
}

#[async_trait]
impl MathService for Calculator {
    async fn calculate_not(&self, a: bool) -> ServiceResult<bool> {
        Ok(!a)
    }

    async fn calculate_and(&self, a: bool, b: bool) -> ServiceResult<bool> {
        Ok(a && b)
    }

    async fn calculate_gate(&self, gate: Gate, a: bool, b: bool) -> ServiceResult<bool> {
        Ok(match gate {
            Gate::And => a && b,
            Gate::Or => a || b,
        })
    }

    async fn calculate_completable(&self) -> ServiceResult<()> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn calculate_merge_to_list(&self, a: bool, b: bool) -> ServiceResult<Vec<bool>> {
        Ok(vec![a, b])
    }

    async fn calculate_list_or(&self, values: Vec<bool>) -> ServiceResult<bool> {
        Ok(values.into_iter().any(|v| v))
    }

    async fn calculate_maybe(&self, should_return: bool) -> ServiceResult<Option<bool>> {
        Ok(should_return.then_some(true))
    }

    async fn calculate_custom_record_or(
        &self,
        operation: BooleanOperation,
    ) -> ServiceResult<ComputedBooleanOperation> {
        let b = operation
            .b
            .ok_or_else(|| ServiceError::application("operand b is required"))?;
        Ok(ComputedBooleanOperation {
            result: operation.a || b,
            operation,
        })
    }
}

struct Clock;

#[async_trait]
impl ClockService for Clock {
    async fn identify(&self, id: Uuid) -> ServiceResult<Uuid> {
        Ok(id)
    }

    async fn later(&self, at: DateTime<Utc>, seconds: i64) -> ServiceResult<DateTime<Utc>> {
        at.checked_add_signed(chrono::Duration::seconds(seconds))
            .ok_or_else(|| ServiceError::application("timestamp overflow"))
    }

    async fn stall(&self, millis: i64) -> ServiceResult<()> {
        tokio::time::sleep(Duration::from_millis(millis as u64)).await;
        Ok(())
    }

    async fn reversed(&self, mut ids: Vec<Uuid>) -> ServiceResult<Vec<Uuid>> {
        ids.reverse();
        Ok(ids)
    }

    async fn earliest(&self, at: Vec<DateTime<Utc>>) -> ServiceResult<Option<DateTime<Utc>>> {
        Ok(at.into_iter().min())
    }

    async fn owners(&self, ids: BTreeMap<String, Uuid>, id: Uuid) -> ServiceResult<Vec<String>> {
        Ok(ids
            .into_iter()
            .filter(|(_, owned)| *owned == id)
            .map(|(owner, _)| owner)
            .collect())
    }
}

const UUID_TEXT: &str = "123e4567-e89b-12d3-a456-426614174000";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    local: LocalBus,
    calculator: Arc<Calculator>,
    server: ServiceServer,
    client: MathServiceClient,
}

async fn harness() -> Harness {
    init_tracing();
    let local = LocalBus::new();
    let bus: Arc<dyn Bus> = Arc::new(local.clone());
    let calculator = Arc::new(Calculator::default());
    let server = ServiceServer::bind::<dyn MathService>(bus.clone(), calculator.clone())
        .await
        .unwrap();
    let client = MathServiceClient::new(bus).unwrap();
    Harness {
        local,
        calculator,
        server,
        client,
    }
}

/// A bus that binds `reply` at `address` instead of a real implementation.
async fn canned_reply(address: String, reply: ReplyEnvelope) -> Arc<dyn Bus> {
    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
    busrpc::codec::register_envelope_codecs(bus.as_ref()).unwrap();
    // Dropping the registration leaves the handler bound.
    bus.consumer(
        &address,
        handler_fn(move |_| {
            let reply = reply.clone();
            async move {
                let body = reply.encode().map_err(|e| Failure::new(e.to_string()))?;
                Ok::<_, Failure>(Message::new(ReplyEnvelope::TAG, body))
            }
        }),
    )
    .await
    .unwrap();
    bus
}

fn recipient_message(err: ServiceError) -> String {
    match err {
        ServiceError::Transport(BusError::Recipient { code, message }) => {
            assert_eq!(code, busrpc::bus::FAILURE_CODE);
            message
        }
        other => panic!("expected a recipient failure, got {other:?}"),
    }
}

#[tokio::test]
async fn boolean_and() {
    let Harness { client, server, .. } = harness().await;
    assert!(!client.calculate_and(true, false).await.unwrap());
    assert!(client.calculate_and(true, true).await.unwrap());
    assert!(!client.calculate_not(true).await.unwrap());
    server.close().await.unwrap();
}

#[tokio::test]
async fn list_argument_and_result() {
    let Harness { client, server, .. } = harness().await;
    assert!(client.calculate_list_or(vec![false, true]).await.unwrap());
    assert!(!client.calculate_list_or(vec![]).await.unwrap());
    assert_eq!(
        client.calculate_merge_to_list(false, true).await.unwrap(),
        vec![false, true]
    );
    server.close().await.unwrap();
}

#[tokio::test]
async fn none_arity_completes() {
    let Harness {
        client,
        server,
        calculator,
        ..
    } = harness().await;
    client.calculate_completable().await.unwrap();
    assert_eq!(calculator.completions.load(Ordering::SeqCst), 1);
    server.close().await.unwrap();
}

#[tokio::test]
async fn optional_result() {
    let Harness { client, server, .. } = harness().await;
    assert_eq!(client.calculate_maybe(true).await.unwrap(), Some(true));
    assert_eq!(client.calculate_maybe(false).await.unwrap(), None);
    server.close().await.unwrap();
}

#[tokio::test]
async fn optional_null_is_no_value() {
    let address = descriptor::address("MathService", "calculate_maybe");
    let bus = canned_reply(address, ReplyEnvelope::with(Value::Null)).await;
    let client = MathServiceClient::new(bus).unwrap();
    assert_eq!(client.calculate_maybe(true).await.unwrap(), None);
}

#[tokio::test]
async fn exactly_one_null_is_a_coercion_failure() {
    let address = descriptor::address("MathService", "calculate_and");
    let bus = canned_reply(address, ReplyEnvelope::with(Value::Null)).await;
    let client = MathServiceClient::new(bus).unwrap();
    let err = client.calculate_and(true, true).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Coercion(CoercionError::MissingValue)
    ));
}

#[tokio::test]
async fn records_round_trip() {
    let Harness { client, server, .. } = harness().await;
    let operation = BooleanOperation {
        a: false,
        b: Some(true),
    };
    let computed = client
        .calculate_custom_record_or(operation.clone())
        .await
        .unwrap();
    assert_eq!(
        computed,
        ComputedBooleanOperation {
            operation,
            result: true
        }
    );
    server.close().await.unwrap();
}

#[tokio::test]
async fn application_failure_reaches_caller() {
    let Harness { client, server, .. } = harness().await;
    let err = client
        .calculate_custom_record_or(BooleanOperation { a: true, b: None })
        .await
        .unwrap_err();
    let message = recipient_message(err);
    assert!(message.contains("operand b is required"), "{message}");
    server.close().await.unwrap();
}

#[tokio::test]
async fn record_missing_required_field() {
    let Harness { client, server, .. } = harness().await;
    let partial = Value::Map(BTreeMap::from([("b".to_owned(), Value::Bool(true))]));
    let err = client
        .dispatcher()
        .call::<ComputedBooleanOperation>("calculate_custom_record_or", vec![partial])
        .await
        .unwrap_err();
    let message = recipient_message(err);
    assert!(message.contains("missing required field a"), "{message}");
    server.close().await.unwrap();
}

#[tokio::test]
async fn enum_arguments_match_by_name() {
    let Harness { client, server, .. } = harness().await;
    assert!(client.calculate_gate(Gate::Or, false, true).await.unwrap());
    assert!(!client.calculate_gate(Gate::And, false, true).await.unwrap());

    let err = client
        .dispatcher()
        .call::<bool>(
            "calculate_gate",
            vec![Value::from("Xor"), Value::Bool(true), Value::Bool(true)],
        )
        .await
        .unwrap_err();
    let message = recipient_message(err);
    assert!(message.contains("not a variant of enum Gate"), "{message}");
    server.close().await.unwrap();
}

#[tokio::test]
async fn argument_count_mismatch_is_a_bad_request() {
    let Harness {
        local, server, ..
    } = harness().await;
    let body = RequestEnvelope::new(vec![Value::Bool(true)])
        .encode()
        .unwrap();
    let err = local
        .request(
            &descriptor::address("MathService", "calculate_and"),
            Message::new(RequestEnvelope::TAG, body),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
    match err {
        BusError::Recipient { message, .. } => {
            assert!(message.starts_with("bad request"), "{message}")
        }
        other => panic!("expected a recipient failure, got {other:?}"),
    }
    server.close().await.unwrap();
}

#[tokio::test]
async fn arity_mismatch_is_refused_before_sending() {
    let Harness { client, server, .. } = harness().await;
    let err = client
        .dispatcher()
        .call::<bool>("calculate_maybe", vec![Value::Bool(true)])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Config(_)));

    let err = client
        .dispatcher()
        .call::<bool>("calculate_xor", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Config(_)));
    server.close().await.unwrap();
}

#[tokio::test]
async fn uuid_coercion() {
    init_tracing();
    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
    let server = ServiceServer::bind::<dyn ClockService>(bus.clone(), Arc::new(Clock))
        .await
        .unwrap();
    let client = ClockServiceClient::new(bus).unwrap();

    let id = Uuid::parse_str(UUID_TEXT).unwrap();
    assert_eq!(client.identify(id).await.unwrap(), id);

    // Untyped text is coerced against the declared parameter type.
    let got = client
        .dispatcher()
        .call::<Uuid>("identify", vec![Value::from(UUID_TEXT)])
        .await
        .unwrap();
    assert_eq!(got, id);

    let err = client
        .dispatcher()
        .call::<Uuid>("identify", vec![Value::from("not-a-uuid")])
        .await
        .unwrap_err();
    let message = recipient_message(err);
    assert!(message.contains("malformed UUID"), "{message}");
    server.close().await.unwrap();
}

#[tokio::test]
async fn malformed_uuid_result_is_a_coercion_failure() {
    let address = descriptor::address("ClockService", "identify");
    let bus = canned_reply(address, ReplyEnvelope::with(Value::from("not-a-uuid"))).await;
    let client = ClockServiceClient::new(bus).unwrap();
    let err = client.identify(Uuid::nil()).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Coercion(CoercionError::MalformedUuid(_))
    ));
}

#[tokio::test]
async fn timestamps_and_longs() {
    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
    let server = ServiceServer::bind::<dyn ClockService>(bus.clone(), Arc::new(Clock))
        .await
        .unwrap();
    let client = ClockServiceClient::new(bus).unwrap();

    let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let expected = DateTime::from_timestamp(1_700_000_060, 0).unwrap();
    assert_eq!(client.later(at, 60).await.unwrap(), expected);
    server.close().await.unwrap();
}

#[tokio::test]
async fn timeouts() {
    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
    let server = ServiceServer::bind::<dyn ClockService>(bus.clone(), Arc::new(Clock))
        .await
        .unwrap();
    let config = ClientConfig {
        default_timeout: Duration::from_millis(50),
    };
    let client = ClockServiceClient::with_config(bus, config).unwrap();

    let methods = client.dispatcher().descriptor();
    assert_eq!(
        methods.method("identify").unwrap().timeout,
        Some(Duration::from_secs(5))
    );
    assert_eq!(methods.method("stall").unwrap().timeout, None);

    let err = client.stall(5_000).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Transport(BusError::Timeout(d)) if d == Duration::from_millis(50)
    ));
    client.stall(0).await.unwrap();
    server.close().await.unwrap();
}

struct CountingBus {
    inner: LocalBus,
    requests: AtomicUsize,
}

#[async_trait]
impl Bus for CountingBus {
    async fn request(
        &self,
        address: &str,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, BusError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.inner.request(address, message, timeout).await
    }

    async fn consumer(
        &self,
        address: &str,
        handler: Arc<dyn busrpc::bus::Handler>,
    ) -> Result<Box<dyn busrpc::bus::Registration>, BusError> {
        self.inner.consumer(address, handler).await
    }

    fn register_default_codec(&self, codec: Arc<dyn MessageCodec>) -> Result<(), BusError> {
        self.inner.register_default_codec(codec)
    }
}

#[tokio::test]
async fn calls_are_cold() {
    let counting = Arc::new(CountingBus {
        inner: LocalBus::new(),
        requests: AtomicUsize::new(0),
    });
    let bus: Arc<dyn Bus> = counting.clone();
    let server = ServiceServer::bind::<dyn MathService>(bus.clone(), Arc::new(Calculator::default()))
        .await
        .unwrap();
    let client = MathServiceClient::new(bus).unwrap();

    let call = client
        .dispatcher()
        .call::<bool>("calculate_not", vec![Value::Bool(false)]);
    tokio::task::yield_now().await;
    assert_eq!(counting.requests.load(Ordering::SeqCst), 0);

    assert!(call.await.unwrap());
    assert_eq!(counting.requests.load(Ordering::SeqCst), 1);

    let second = client.calculate_not(true);
    drop(second);
    assert_eq!(counting.requests.load(Ordering::SeqCst), 1);
    server.close().await.unwrap();
}

#[tokio::test]
async fn close_unregisters_every_address() {
    let Harness {
        local,
        server,
        client,
        ..
    } = harness().await;
    let addresses: Vec<String> = server.addresses().map(str::to_owned).collect();
    assert_eq!(addresses.len(), 8);
    assert!(addresses.contains(&"t_service_MathService#calculate_and".to_owned()));
    assert!(addresses.iter().all(|address| local.has_handler(address)));

    server.close().await.unwrap();
    assert!(addresses.iter().all(|address| !local.has_handler(address)));

    let err = client.calculate_and(true, true).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Transport(BusError::NoHandlers(_))
    ));
}

#[tokio::test]
async fn second_bind_of_same_interface_fails() {
    let Harness {
        local,
        server,
        client,
        ..
    } = harness().await;
    let bus: Arc<dyn Bus> = Arc::new(local);
    let err = ServiceServer::bind::<dyn MathService>(bus, Arc::new(Calculator::default()))
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        ServiceError::Transport(BusError::AddressInUse(_))
    ));
    assert!(client.calculate_and(true, true).await.unwrap());
    server.close().await.unwrap();
}

struct ForeignCodec;

impl MessageCodec for ForeignCodec {
    fn type_tag(&self) -> &'static str {
        RequestEnvelope::TAG
    }

    fn name(&self) -> &'static str {
        "someone-else"
    }
}

#[tokio::test]
async fn conflicting_codec_is_refused() {
    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
    bus.register_default_codec(Arc::new(ForeignCodec)).unwrap();
    let err = MathServiceClient::new(bus).err().unwrap();
    assert!(matches!(
        err,
        ServiceError::Transport(BusError::CodecConflict { .. })
    ));
}

#[tokio::test]
async fn uuid_and_timestamp_containers() {
    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
    let server = ServiceServer::bind::<dyn ClockService>(bus.clone(), Arc::new(Clock))
        .await
        .unwrap();
    let client = ClockServiceClient::new(bus).unwrap();

    let first = Uuid::parse_str(UUID_TEXT).unwrap();
    let second = Uuid::nil();
    assert_eq!(
        client.reversed(vec![first, second]).await.unwrap(),
        vec![second, first]
    );
    assert_eq!(client.reversed(vec![]).await.unwrap(), Vec::<Uuid>::new());

    let early = DateTime::from_timestamp(1_600_000_000, 250_000_000).unwrap();
    let late = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    assert_eq!(client.earliest(vec![late, early]).await.unwrap(), Some(early));
    assert_eq!(client.earliest(vec![]).await.unwrap(), None);

    let ids = BTreeMap::from([("ann".to_owned(), first), ("bob".to_owned(), second)]);
    assert_eq!(client.owners(ids, first).await.unwrap(), vec!["ann".to_owned()]);

    let err = client
        .dispatcher()
        .call::<Vec<Uuid>>("reversed", vec![Value::List(vec![Value::from("not-a-uuid")])])
        .await
        .unwrap_err();
    let message = recipient_message(err);
    assert!(message.contains("not-a-uuid"), "{message}");
    server.close().await.unwrap();
}

#[tokio::test]
async fn local_methods_stay_off_the_bus() {
    let Harness { client, server, .. } = harness().await;
    assert!(client.calculate_xor(true, false));
    assert!(!client.calculate_xor(true, true));
    assert!(client.dispatcher().descriptor().method("calculate_xor").is_none());
    assert!(server.addresses().all(|address| !address.ends_with("#calculate_xor")));
    server.close().await.unwrap();
}
