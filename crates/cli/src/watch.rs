use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use trustlink_core::config::Settings;
use trustlink_core::Entity;
use trustlink_realtime::{Notice, QueryOptions, ReconnectingQuery, RowSource};

use crate::app::App;

pub const OWNER_COLUMN: &str = "customer_id";

pub fn watch_options<T: Entity>(settings: &Settings, customer: Option<&str>) -> QueryOptions {
    let options = QueryOptions::for_entity::<T>().with_policy(settings.reconnect_policy());
    match customer {
        Some(customer) => options.owned_by(OWNER_COLUMN, customer),
        None => options,
    }
}

/// Streams notices for one table as JSON lines until Ctrl-C or until the
/// query gives up reconnecting.
pub async fn run_watch<T: Entity + Serialize>(
    app: &App,
    customer: Option<&str>,
) -> anyhow::Result<()> {
    let (socket, registry) = app.realtime();
    let options = watch_options::<T>(&app.settings, customer);
    let source: Arc<dyn RowSource<T>> = app.rows();
    info!(table = T::TABLE, channel = %options.channel_name, "watching");

    let (query, mut notices) =
        ReconnectingQuery::<T>::start(Arc::clone(&registry), source, options);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted");
                break;
            }
            notice = notices.recv() => {
                let Some(notice) = notice else { break };
                println!("{}", serde_json::to_string(&notice)?);
                if notice == Notice::Connected {
                    for item in query.items().await {
                        println!("{}", serde_json::to_string(&item)?);
                    }
                }
            }
        }
    }

    let phase = query.phase();
    query.stop().await;
    registry.cleanup().await;
    socket.disconnect().await;
    info!(?phase, "watch stopped");
    Ok(())
}
