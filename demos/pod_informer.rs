use informer::{
    fake::{objects::Pod, FakeClient},
    runtime::{handler::HandlerFuncs, Informer, InformerConfig},
    ResourceExt,
};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::*;

const PHASES: [&str; 3] = ["Pending", "Running", "Succeeded"];

// Randomly creates, advances and deletes a handful of pods
fn spawn_churn(client: FakeClient, namespace: String, stop: CancellationToken) {
    tokio::spawn(async move {
        let pods = client.tracker::<Pod>();
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                _ = interval.tick() => {}
            }
            let (name, roll) = {
                let mut rng = rand::rng();
                (format!("pod-{}", rng.random_range(0..5)), rng.random_range(0..4))
            };
            let result = match pods.get(namespace.as_str(), &name) {
                Ok(_) if roll == 0 => pods.delete(namespace.as_str(), &name).map(|_| ()),
                Ok(pod) => {
                    let phase = PHASES[roll % PHASES.len()];
                    pods.update(pod.with_phase(phase)).map(|_| ())
                }
                Err(_) => pods
                    .create_in(&namespace, Pod::new(&name).with_phase(PHASES[0]))
                    .map(|_| ()),
            };
            if let Err(err) = result {
                warn!("churn failed: {err}");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".into());
    let client = FakeClient::new();
    client.tracker::<Pod>().create_in(&namespace, Pod::new("seed"))?;

    let stop = CancellationToken::new();
    spawn_churn(client.clone(), namespace.clone(), stop.clone());

    let config = InformerConfig::default().watcher(informer::runtime::watcher::Config::default().within(&namespace));
    let pods = Informer::<Pod>::spawn(client, config, stop.clone());
    pods.add_handler(
        HandlerFuncs::default()
            .on_add(|pod: &Pod| {
                info!("pod added: {}", pod.name_any());
                Ok(())
            })
            .on_update(|old: &Pod, new: &Pod| {
                info!("pod changed: {} ({:?} -> {:?})", new.name_any(), old.phase(), new.phase());
                Ok(())
            })
            .on_delete(|pod: &Pod| {
                info!("pod deleted: {}", pod.name_any());
                Ok(())
            }),
    );

    tokio::signal::ctrl_c().await?;
    stop.cancel();
    Ok(())
}
