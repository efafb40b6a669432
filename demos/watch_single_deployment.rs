use futures::{pin_mut, StreamExt};
use informer::{
    fake::{objects::Deployment, FakeClient},
    runtime::{watcher, WatchStreamExt},
    ResourceExt,
};
use std::time::Duration;
use tracing::*;

// Keeps scaling the deployment, and occasionally deletes and recreates it
fn spawn_churn(client: FakeClient, namespace: String, name: String) {
    tokio::spawn(async move {
        let deployments = client.tracker::<Deployment>();
        for round in 1u32.. {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let result = match deployments.get(namespace.as_str(), &name) {
                Ok(_) if round % 5 == 0 => deployments.delete(namespace.as_str(), &name),
                Ok(mut current) => {
                    current.spec.replicas = (current.spec.replicas + 1) % 4;
                    deployments.update(current)
                }
                Err(_) => deployments.create_in(&namespace, Deployment::new(&name)),
            };
            if let Err(err) = result {
                warn!("churn failed: {err}");
            }
            if round % 7 == 0 {
                // forces the watcher to resume
                deployments.disconnect_watchers();
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".into());
    let name = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: watch_single_deployment <name>"))?;

    let client = FakeClient::new();
    let deployments = client.tracker::<Deployment>();
    deployments.create_in(&namespace, Deployment::new(&name))?;
    deployments.create_in(&namespace, Deployment::new("unrelated"))?;
    spawn_churn(client.clone(), namespace.clone(), name.clone());

    let config = watcher::Config::default()
        .within(&namespace)
        .fields(&format!("metadata.name={name}"));
    let events = watcher::<Deployment, _>(client, config).default_backoff();
    pin_mut!(events);

    let ctrl_c = tokio::signal::ctrl_c();
    pin_mut!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.next() => match event.transpose() {
                Ok(Some(watcher::Event::Apply(d))) => {
                    info!("Deployment {} got event: applied ({} replicas)", d.name_any(), d.spec.replicas);
                }
                Ok(Some(watcher::Event::Delete(d))) => info!("Deployment {} got event: deleted", d.name_any()),
                Ok(Some(watcher::Event::InitApply(d))) => info!("Deployment {} got event: listed", d.name_any()),
                Ok(Some(watcher::Event::Init | watcher::Event::InitDone)) => {}
                Ok(None) => break,
                Err(err) => warn!("watch interrupted: {err}"),
            },
        }
    }
    Ok(())
}
