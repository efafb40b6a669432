use futures::StreamExt;
use informer::{
    core::params::ListParams,
    runtime::{
        handler::{ChangeEvent, HandlerError},
        watcher, InformerFactory, WatchStreamExt,
    },
    RemoteSource, ResourceExt,
};
use informer_fake::{
    objects::{Deployment, Pod},
    FakeClient,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn informer_sees_objects_created_through_the_client() {
    let client = FakeClient::new();
    let factory = InformerFactory::new(client.clone());
    let pods = factory.informer::<Pod>();

    let (tx, mut added) = mpsc::unbounded_channel();
    pods.add_handler(move |ev: &ChangeEvent<Pod>| -> Result<(), HandlerError> {
        if let ChangeEvent::Added(pod) = ev {
            tx.send(pod.clone())?;
        }
        Ok(())
    });

    let stop = CancellationToken::new();
    factory.start(&stop);
    assert!(factory.wait_for_cache_sync(&stop).await);

    client
        .tracker::<Pod>()
        .create_in("test-ns", Pod::new("my-pod"))
        .unwrap();
    let seen = tokio::time::timeout(Duration::from_secs(5), added.recv())
        .await
        .expect("timed out waiting for the informer")
        .unwrap();
    assert_eq!(seen.name_any(), "my-pod");
    assert_eq!(seen.namespace().as_deref(), Some("test-ns"));

    let stored = client.tracker::<Pod>().get("test-ns", "my-pod").unwrap();
    let cached = pods.lister().namespaced("test-ns").get("my-pod").unwrap();
    assert_eq!(*cached, stored);
    stop.cancel();
}

#[tokio::test]
async fn missing_objects_are_reported_as_not_found() {
    let client = FakeClient::new();
    client
        .tracker::<Pod>()
        .create_in("default", Pod::new("nginx").with_phase("Running"))
        .unwrap();
    let factory = InformerFactory::new(client.clone())
        .namespace("default")
        .resync_period(Duration::from_secs(15));
    let pods = factory.informer::<Pod>();
    let stop = CancellationToken::new();
    factory.start(&stop);
    assert!(factory.wait_for_cache_sync(&stop).await);

    let err = pods.lister().get("default", "busybox").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), r#"Pod "busybox" not found in namespace "default""#);
    let nginx = pods.lister().get("default", "nginx").unwrap();
    assert_eq!(nginx.phase(), Some("Running"));
    stop.cancel();
}

#[tokio::test]
async fn watching_a_single_object_by_name() {
    let client = FakeClient::new();
    let deployments = client.tracker::<Deployment>();
    deployments.create_in("default", Deployment::new("web")).unwrap();
    deployments.create_in("default", Deployment::new("db")).unwrap();

    let config = watcher::Config::default().within("default").fields("metadata.name=web");
    let mut applied = watcher::<Deployment, _>(client.clone(), config).applied_objects().boxed();
    let first = applied.next().await.unwrap().unwrap();
    assert_eq!(first.name_any(), "web");

    let mut scaled = first.clone();
    scaled.spec.replicas = 3;
    deployments.update(scaled).unwrap();
    deployments.update(deployments.get("default", "db").unwrap()).unwrap();
    let next = applied.next().await.unwrap().unwrap();
    assert_eq!(next.name_any(), "web");
    assert_eq!(next.spec.replicas, 3);
}

#[tokio::test]
async fn raw_watches_resume_from_listed_versions() {
    let client = FakeClient::new();
    let pods = client.tracker::<Pod>();
    pods.create_in("default", Pod::new("a")).unwrap();
    let listed = RemoteSource::<Pod>::list(&client, &ListParams::default()).await.unwrap();
    pods.delete("default", "a").unwrap();
    let rv = listed.metadata.resource_version.unwrap();
    let mut events = RemoteSource::<Pod>::watch(&client, &ListParams::default(), &rv)
        .await
        .unwrap();
    assert!(matches!(
        events.next().await,
        Some(Ok(informer::core::WatchEvent::Deleted(_)))
    ));
}
