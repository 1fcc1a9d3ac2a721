use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use event_transcoding::config::TranscoderConfig;
use event_transcoding::domain::{self, order, sensor};
use event_transcoding::event_sourcing::{
    deserialize_domain_entity, downcast_entity, id_prefix_from_event_type, make_stored_entity_id,
    topic_from_entity_type, AesGcmCipher, DomainEntity, EventStore, JsonTranscoder, NumericArray,
    StoredEventRepository,
};
use event_transcoding::metrics::TranscoderMetrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,event_transcoding=debug")),
        )
        .init();

    tracing::info!("Starting stored-event transcoding demo");

    // === 1. Configuration ===
    let mut config = TranscoderConfig::from_env()?;
    if config.cipher_key.is_none() {
        tracing::warn!("No cipher key configured, generating an ephemeral one");
        config.cipher_key = Some(AesGcmCipher::generate_key());
    }
    config.validate()?;
    tracing::info!(?config, "Loaded configuration");

    // === 2. Type registry, metrics, transcoder, store ===
    let registry = Arc::new(domain::type_registry()?);
    let metrics = Arc::new(TranscoderMetrics::new()?);
    let transcoder = Arc::new(
        JsonTranscoder::from_config(&config, registry.clone())?.with_metrics(metrics.clone()),
    );
    let store = Arc::new(EventStore::new(transcoder));

    // === 3. Order lifecycle ===
    let order_id = Uuid::new_v4().to_string();
    let created = order::OrderCreated::new(
        &order_id,
        Uuid::new_v4(),
        vec![
            order::OrderItem::new(Uuid::new_v4(), 2)?,
            order::OrderItem::new(Uuid::new_v4(), 1)?,
        ],
    )?;
    let updated = order::OrderItemsUpdated::new(
        &order_id,
        vec![order::OrderItem::new(Uuid::new_v4(), 5)?],
        Some("Customer changed basket".to_string()),
    )?;
    let paid = order::OrderPaymentRecorded::new(&order_id, 12_999, "4242")?;
    let shipped = order::OrderShipped::new(
        &order_id,
        "1Z999AA10123456784",
        "UPS",
        domain::now().date_naive() + Duration::days(3),
        order::ShippingAddress {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            country: "US".to_string(),
        },
    );

    let version = store
        .append_domain_events(0, &[&created, &updated, &paid, &shipped])
        .await?;
    tracing::info!(order_id = %order_id, version, "Order events stored");

    let stream_id = make_stored_entity_id(id_prefix_from_event_type::<order::OrderCreated>(), &order_id);
    for record in store.load_events(&stream_id).await? {
        tracing::info!(
            topic = %record.event_topic,
            event_id = %record.event_id,
            payload = %record.event_attrs,
            "Stored record"
        );
    }

    // === 4. Sensor readings (numeric arrays) ===
    let reading = sensor::SensorReadingsRecorded::new(
        "thermo-7",
        NumericArray::F64(vec![20.25, 20.5, 21.0, 20.75]),
        NaiveDate::from_ymd_opt(2024, 3, 1).ok_or_else(|| anyhow::anyhow!("invalid sample date"))?,
        "celsius",
    )
    .with_calibration("offset", -0.125);
    store.append_domain_events(0, &[&reading]).await?;

    // === 5. Concurrent replay ===
    let mut handles = Vec::new();
    for reader in 0..4 {
        let store = store.clone();
        let stream_id = stream_id.clone();
        handles.push(tokio::spawn(async move {
            let events = store.load_domain_events(&stream_id).await?;
            tracing::debug!(reader, event_count = events.len(), "Replayed order stream");
            anyhow::Ok(events.len())
        }));
    }
    for handle in handles {
        let replayed = handle.await??;
        tracing::info!(replayed, "Reader finished");
    }

    for event in store.load_domain_events("Sensor::thermo-7").await? {
        tracing::info!(?event, "Replayed sensor event");
    }

    // === 6. Entity snapshot ===
    let snapshot = order::Order::from_created(&created);
    let entity = deserialize_domain_entity(
        &*registry,
        &topic_from_entity_type::<order::Order>(),
        snapshot.state(),
    )?;
    let restored = downcast_entity::<order::Order>(entity)
        .ok_or_else(|| anyhow::anyhow!("snapshot did not restore an Order"))?;
    tracing::info!(order_id = %restored.id, status = %restored.status, "Restored order snapshot");

    tracing::info!(
        families = metrics.registry().gather().len(),
        "Demo complete"
    );

    Ok(())
}
