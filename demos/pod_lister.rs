use informer::{
    fake::{objects::Pod, FakeClient},
    runtime::{handler::HandlerFuncs, InformerFactory},
    ResourceExt,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let client = FakeClient::new();
    let pods = client.tracker::<Pod>();
    pods.create_in("default", Pod::new("nginx").with_phase("Running"))?;
    if std::env::args().any(|arg| arg == "--with-busybox") {
        pods.create_in("default", Pod::new("busybox").with_phase("Pending"))?;
    }

    let factory = InformerFactory::new(client)
        .namespace("default")
        .resync_period(Duration::from_secs(15))
        .tweak_list_params(|config| config.field_selector = None);
    let informer = factory.informer::<Pod>();
    informer.add_handler(
        HandlerFuncs::default()
            .on_add(|pod: &Pod| {
                info!("pod added: {}", pod.name_any());
                Ok(())
            })
            .on_update(|_: &Pod, new: &Pod| {
                info!("pod changed: {}", new.name_any());
                Ok(())
            })
            .on_delete(|pod: &Pod| {
                info!("pod deleted: {}", pod.name_any());
                Ok(())
            }),
    );

    let stop = CancellationToken::new();
    factory.start(&stop);
    if !factory.wait_for_cache_sync(&stop).await {
        anyhow::bail!("cache did not sync");
    }
    info!("cache synced");

    match informer.lister().namespaced("default").get("busybox") {
        Ok(pod) => info!("pod busybox is {}", pod.phase().unwrap_or("Unknown")),
        Err(err) if err.is_not_found() => info!("pod busybox not found"),
        Err(err) => return Err(err.into()),
    }

    // resyncs show up as changes every 15s
    tokio::signal::ctrl_c().await?;
    stop.cancel();
    Ok(())
}
