use std::sync::Arc;

use crate::{
    client::SplitClient,
    config::{self, OperationMode, SdkConfig},
    evaluator::Evaluator,
    impression_listener::ImpressionListener,
    storage::{
        memory::{
            InMemoryImpressionStorage, InMemoryMetricsStorage, InMemorySegmentStorage,
            InMemorySplitStorage,
        },
        shared::{
            KvBackend, PrefixedClient, RedisBackend, SharedImpressionStorage,
            SharedMetricsStorage, SharedSegmentStorage, SharedSplitStorage,
        },
        Storages,
    },
    sync::{
        ImpressionRecorder, MetricsRecorder, NoopRecorder, SegmentFetcher, SplitFetcher,
        SyncManager, SyncServices,
    },
    Error, Result, SdkMetadata,
};

/// External pieces plugged into [`SplitFactory`].
///
/// Fetchers are required in standalone modes. Recorders default to discarding telemetry.
///
/// # Examples
/// ```
/// # use splitio_core::{models::ChangeNumber, sync::SplitChanges};
/// # use splitio_core::{Attributes, Collaborators, Impression, Result};
/// let collaborators = Collaborators::new()
///     .split_fetcher(|since: ChangeNumber| -> Result<SplitChanges> {
///         Ok(SplitChanges { splits: vec![], since, till: since })
///     })
///     .impression_listener(|impression: &Impression, _: &Attributes| {
///         println!("{impression:?}");
///     });
/// ```
#[derive(Default)]
pub struct Collaborators {
    split_fetcher: Option<Arc<dyn SplitFetcher>>,
    segment_fetcher: Option<Arc<dyn SegmentFetcher>>,
    impression_recorder: Option<Arc<dyn ImpressionRecorder>>,
    metrics_recorder: Option<Arc<dyn MetricsRecorder>>,
    impression_listener: Option<Box<dyn ImpressionListener + Send + Sync>>,
    backend: Option<Arc<dyn KvBackend>>,
}

impl Collaborators {
    /// Create an empty set of collaborators.
    pub fn new() -> Collaborators {
        Collaborators::default()
    }

    /// Set the source of split changes.
    pub fn split_fetcher(mut self, fetcher: impl SplitFetcher + 'static) -> Collaborators {
        self.split_fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Set the source of segment changes.
    pub fn segment_fetcher(mut self, fetcher: impl SegmentFetcher + 'static) -> Collaborators {
        self.segment_fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Set the impression sink.
    pub fn impression_recorder(
        mut self,
        recorder: impl ImpressionRecorder + 'static,
    ) -> Collaborators {
        self.impression_recorder = Some(Arc::new(recorder));
        self
    }

    /// Set the metrics sink.
    pub fn metrics_recorder(mut self, recorder: impl MetricsRecorder + 'static) -> Collaborators {
        self.metrics_recorder = Some(Arc::new(recorder));
        self
    }

    /// Notify `listener` of every impression recorded by the client.
    pub fn impression_listener(
        mut self,
        listener: impl ImpressionListener + Send + Sync + 'static,
    ) -> Collaborators {
        self.impression_listener = Some(Box::new(listener));
        self
    }

    /// Use `backend` in Redis modes instead of connecting to the configured Redis server.
    pub fn shared_backend(mut self, backend: Arc<dyn KvBackend>) -> Collaborators {
        self.backend = Some(backend);
        self
    }
}

/// Owns storages, the client and, in standalone modes, the background sync.
pub struct SplitFactory {
    config: SdkConfig,
    metadata: SdkMetadata,
    storages: Storages,
    client: SplitClient,
    manager: Option<SyncManager>,
}

impl SplitFactory {
    /// Validate `config` and build an SDK instance.
    ///
    /// In standalone modes the background tasks are started and, if
    /// [`SdkConfig::block_until_ready`] is set, this call waits for the first sync.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfiguration`] if the config is invalid or a standalone mode lacks
    ///   fetchers.
    /// - [`Error::Redis`] if the Redis url is invalid.
    /// - [`Error::Unauthorized`] or [`Error::ReadyTimeout`] while blocking until ready.
    pub fn new(
        api_key: &str,
        mut config: SdkConfig,
        collaborators: Collaborators,
    ) -> Result<SplitFactory> {
        config::normalize(api_key, &mut config)?;
        let metadata = SdkMetadata::new(&config.instance_name, &config.ip_address);
        let storages = build_storages(&config, &metadata, collaborators.backend)?;

        let evaluator = Evaluator::new(
            Arc::clone(&storages.splits),
            Arc::clone(&storages.segments),
        );
        let mut client = SplitClient::new(
            Arc::new(evaluator),
            Arc::clone(&storages.impressions),
            Arc::clone(&storages.metrics),
        )
        .with_labels_enabled(config.labels_enabled);
        if let Some(listener) = collaborators.impression_listener {
            client = client.with_boxed_listener(listener);
        }

        let manager = if config.operation_mode.is_standalone() {
            let (Some(split_fetcher), Some(segment_fetcher)) =
                (collaborators.split_fetcher, collaborators.segment_fetcher)
            else {
                return Err(Error::InvalidConfiguration(
                    "split and segment fetchers are required in standalone mode".to_owned(),
                ));
            };
            let services = SyncServices {
                split_fetcher,
                segment_fetcher,
                impression_recorder: collaborators
                    .impression_recorder
                    .unwrap_or_else(|| Arc::new(NoopRecorder)),
                metrics_recorder: collaborators
                    .metrics_recorder
                    .unwrap_or_else(|| Arc::new(NoopRecorder)),
            };
            let manager =
                SyncManager::new(storages.clone(), services, metadata.clone(), config.clone())?;
            manager.start_all()?;
            Some(manager)
        } else {
            None
        };

        log::info!(target: "splitio",
            sdk_version = metadata.sdk_version.as_str(),
            mode:? = config.operation_mode;
            "sdk initialized");

        let factory = SplitFactory {
            config,
            metadata,
            storages,
            client,
            manager,
        };
        if let Some(timeout) = factory.config.block_until_ready {
            factory.wait_until_ready(timeout)?;
        }
        Ok(factory)
    }

    #[allow(missing_docs)]
    pub fn client(&self) -> &SplitClient {
        &self.client
    }

    /// Background sync. `None` in [`OperationMode::RedisConsumer`].
    pub fn manager(&self) -> Option<&SyncManager> {
        self.manager.as_ref()
    }

    #[allow(missing_docs)]
    pub fn storages(&self) -> &Storages {
        &self.storages
    }

    #[allow(missing_docs)]
    pub fn metadata(&self) -> &SdkMetadata {
        &self.metadata
    }

    #[allow(missing_docs)]
    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Block until the first split and segment sync. Returns immediately when another process
    /// keeps storage up to date.
    pub fn wait_until_ready(&self, timeout: std::time::Duration) -> Result<()> {
        match &self.manager {
            Some(manager) => manager.wait_until_ready(timeout),
            None => Ok(()),
        }
    }

    /// Stop background tasks and flush remaining telemetry.
    pub fn destroy(self) -> Result<()> {
        match &self.manager {
            Some(manager) => manager.shutdown(),
            None => Ok(()),
        }
    }
}

fn build_storages(
    config: &SdkConfig,
    metadata: &SdkMetadata,
    backend: Option<Arc<dyn KvBackend>>,
) -> Result<Storages> {
    if config.operation_mode == OperationMode::InMemoryStandalone {
        return Ok(Storages {
            splits: Arc::new(InMemorySplitStorage::new()),
            segments: Arc::new(InMemorySegmentStorage::new()),
            impressions: Arc::new(InMemoryImpressionStorage::new(
                config.advanced.impressions_queue_size,
            )),
            metrics: Arc::new(InMemoryMetricsStorage::new()),
        });
    }

    let backend = match backend {
        Some(backend) => backend,
        None => Arc::new(RedisBackend::new(&config.redis)?),
    };
    let client = PrefixedClient::new(backend, config.redis.prefix.clone());
    Ok(Storages {
        splits: Arc::new(SharedSplitStorage::new(client.clone())),
        segments: Arc::new(SharedSegmentStorage::new(client.clone())),
        impressions: Arc::new(SharedImpressionStorage::new(
            client.clone(),
            metadata.clone(),
            config.advanced.impressions_ttl,
        )),
        metrics: Arc::new(SharedMetricsStorage::new(client, metadata)),
    })
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::{Collaborators, SplitFactory};
    use crate::{
        config::{OperationMode, RedisConfig, SdkConfig},
        evaluator::tests::fixture_splits,
        models::ChangeNumber,
        storage::{
            shared::{KvBackend, LocalBackend, PrefixedClient, SharedSplitStorage},
            Impression, SplitStorage,
        },
        sync::{SegmentChanges, SplitChanges, TaskKind},
        Attributes, Error, Result,
    };

    fn split_fetcher(since: ChangeNumber) -> Result<SplitChanges> {
        let till = 1700000000000;
        Ok(if since < till {
            SplitChanges {
                splits: fixture_splits(),
                since,
                till,
            }
        } else {
            SplitChanges {
                splits: Vec::new(),
                since,
                till: since,
            }
        })
    }

    fn segment_fetcher(name: &str, since: ChangeNumber) -> Result<SegmentChanges> {
        Ok(if since < 10 {
            SegmentChanges {
                name: name.to_owned(),
                added: vec!["alice".to_owned(), "bob".to_owned()],
                removed: Vec::new(),
                since,
                till: 10,
            }
        } else {
            SegmentChanges {
                name: name.to_owned(),
                since,
                till: since,
                ..SegmentChanges::default()
            }
        })
    }

    fn standalone() -> Collaborators {
        Collaborators::new()
            .split_fetcher(split_fetcher)
            .segment_fetcher(segment_fetcher)
    }

    fn ready_config() -> SdkConfig {
        SdkConfig::default().with_block_until_ready(Duration::from_secs(5))
    }

    #[test]
    fn in_memory_standalone_syncs_and_evaluates() {
        let _ = env_logger::builder().is_test(true).try_init();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = SplitFactory::new(
            "api-key",
            ready_config(),
            standalone().impression_listener({
                let seen = seen.clone();
                move |impression: &Impression, _: &Attributes| {
                    seen.lock().unwrap().push(impression.treatment.clone());
                }
            }),
        )
        .unwrap();

        let client = factory.client();
        assert_eq!(
            client.treatment(&"user-2".into(), "rollout_flag", &Attributes::new()),
            "on"
        );
        assert_eq!(
            client.treatment(&"alice".into(), "segment_flag", &Attributes::new()),
            "on"
        );
        assert_eq!(*seen.lock().unwrap(), vec!["on", "on"]);

        let manager = factory.manager().unwrap();
        assert!(manager.is_running(TaskKind::Latencies));
        factory.destroy().unwrap();
    }

    #[test]
    fn rejects_empty_api_key() {
        assert!(matches!(
            SplitFactory::new("", SdkConfig::default(), standalone()),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn standalone_requires_fetchers() {
        assert!(matches!(
            SplitFactory::new("api-key", SdkConfig::default(), Collaborators::new()),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn unauthorized_fails_block_until_ready() {
        let _ = env_logger::builder().is_test(true).try_init();
        let result = SplitFactory::new(
            "bad-key",
            ready_config(),
            Collaborators::new()
                .split_fetcher(|_: ChangeNumber| -> Result<SplitChanges> { Err(Error::Unauthorized) })
                .segment_fetcher(segment_fetcher),
        );
        assert!(matches!(result, Err(Error::Unauthorized)));
    }

    fn redis_config(mode: OperationMode) -> SdkConfig {
        SdkConfig::default()
            .with_operation_mode(mode)
            .with_redis(RedisConfig::default().with_prefix("myapp"))
    }

    #[test]
    fn redis_consumer_reads_shared_storage() {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend: Arc<dyn KvBackend> = Arc::new(LocalBackend::new());
        // Another process keeps definitions up to date.
        SharedSplitStorage::new(PrefixedClient::new(backend.clone(), "myapp"))
            .put_many(fixture_splits(), 1700000000000)
            .unwrap();

        let factory = SplitFactory::new(
            "api-key",
            redis_config(OperationMode::RedisConsumer),
            Collaborators::new().shared_backend(backend.clone()),
        )
        .unwrap();

        assert!(factory.manager().is_none());
        factory.wait_until_ready(Duration::ZERO).unwrap();
        assert_eq!(
            factory
                .client()
                .treatment(&"user-2".into(), "rollout_flag", &Attributes::new()),
            "on"
        );
        assert_eq!(backend.pop_front("myapp.SPLITIO.impressions", 10).unwrap().len(), 1);
        factory.destroy().unwrap();
    }

    #[test]
    fn redis_standalone_writes_shared_storage() {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend: Arc<dyn KvBackend> = Arc::new(LocalBackend::new());

        let factory = SplitFactory::new(
            "api-key",
            redis_config(OperationMode::RedisStandalone).with_block_until_ready(Duration::from_secs(5)),
            standalone().shared_backend(backend.clone()),
        )
        .unwrap();

        assert_eq!(factory.storages().splits.till().unwrap(), 1700000000000);
        assert_eq!(
            backend.get("myapp.SPLITIO.splits.till").unwrap().as_deref(),
            Some("1700000000000")
        );
        assert!(backend
            .set_contains("myapp.SPLITIO.segment.employees", "bob")
            .unwrap());
        factory.destroy().unwrap();
    }
}
