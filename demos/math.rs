use async_trait::async_trait;
use busrpc::{service, Bus, LocalBus, ServiceResult, ServiceServer};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

service! {
    pub trait MathService for MathServiceClient {
        fn calculate_and(a: bool, b: bool) -> bool;
        fn calculate_merge_to_list(a: bool, b: bool) -> Vec<bool>;
        #[timeout(5)]
        fn calculate_maybe(should_return: bool) -> Option<bool>;
    }
}

struct Calculator;

#[async_trait]
impl MathService for Calculator {
    async fn calculate_and(&self, a: bool, b: bool) -> ServiceResult<bool> {
        Ok(a && b)
    }

    async fn calculate_merge_to_list(&self, a: bool, b: bool) -> ServiceResult<Vec<bool>> {
        Ok(vec![a, b])
    }

    async fn calculate_maybe(&self, should_return: bool) -> ServiceResult<Option<bool>> {
        Ok(should_return.then_some(true))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
    let server = ServiceServer::bind::<dyn MathService>(bus.clone(), Arc::new(Calculator))
        .await
        .unwrap();
    for address in server.addresses() {
        println!("serving {address}");
    }

    let client = MathServiceClient::new(bus).unwrap();
    println!("true AND false = {}", client.calculate_and(true, false).await.unwrap());
    println!("merged: {:?}", client.calculate_merge_to_list(false, true).await.unwrap());
    println!("maybe(false) = {:?}", client.calculate_maybe(false).await.unwrap());

    server.close().await.unwrap();
}
