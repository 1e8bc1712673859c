use std::sync::Arc;

use bytes::Bytes;
use cadpub_cache::LocalArtifactCache;
use cadpub_descriptor::{DescriptorAssembler, ProjectDescriptor, ProjectMetadata, ProjectStorage};
use cadpub_engine::EngineRegistry;
use cadpub_pipeline::{PublishingCoordinator, RevisionResult};
use cadpub_store::ObjectStore;
use cadpub_types::{ArtifactKind, Project, RevisionHash};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::SdkResult;
use crate::settings::Settings;

/// Publishes CAD revisions and describes them to clients.
pub struct DerivativeService {
    settings: Settings,
    store: Arc<dyn ObjectStore>,
    cache: Arc<LocalArtifactCache>,
    coordinator: PublishingCoordinator,
    assembler: DescriptorAssembler,
}

impl DerivativeService {
    /// Validate `settings`, check that `engines` can produce every mandatory
    /// kind and create the cache root.
    pub async fn open(
        settings: Settings,
        store: Arc<dyn ObjectStore>,
        engines: EngineRegistry,
    ) -> SdkResult<Self> {
        settings.validate()?;
        engines.ensure_covers(settings.pipeline.mandatory_kinds.iter().copied())?;

        let cache = Arc::new(LocalArtifactCache::open(settings.cache.clone()).await?);
        let coordinator = PublishingCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            engines,
            settings.pipeline.clone(),
        )?;
        let assembler = DescriptorAssembler::new(
            Arc::clone(&cache),
            settings.links.clone(),
            settings.pipeline.mandatory_kinds.iter().copied(),
        )?;
        info!(
            bucket = store.bucket(),
            cache = %settings.cache.root.display(),
            "derivative service ready"
        );
        Ok(Self {
            settings,
            store,
            cache,
            coordinator,
            assembler,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn cache(&self) -> &LocalArtifactCache {
        &self.cache
    }

    pub fn coordinator(&self) -> &PublishingCoordinator {
        &self.coordinator
    }

    /// Publish a new upload. The revision hash is the content hash of
    /// `source`.
    pub async fn publish(
        &self,
        project: &Project,
        source: Bytes,
        kinds: impl IntoIterator<Item = ArtifactKind>,
    ) -> SdkResult<RevisionResult> {
        let hash = RevisionHash::of_content(&source);
        self.publish_revision(project, &hash, source, kinds, &CancellationToken::new())
            .await
    }

    /// Publish revision `hash`, cancellable through `cancel`.
    pub async fn publish_revision(
        &self,
        project: &Project,
        hash: &RevisionHash,
        source: Bytes,
        kinds: impl IntoIterator<Item = ArtifactKind>,
        cancel: &CancellationToken,
    ) -> SdkResult<RevisionResult> {
        Ok(self
            .coordinator
            .publish_with_cancel(project, hash, source, kinds, cancel)
            .await?)
    }

    /// Descriptor of the project's current revision.
    pub async fn describe(&self, storage: &ProjectStorage) -> SdkResult<ProjectDescriptor> {
        Ok(self.assembler.to_descriptor(storage, self.store.as_ref()).await?)
    }

    /// Descriptor of a specific revision.
    pub async fn describe_revision(
        &self,
        storage: &ProjectStorage,
        hash: &RevisionHash,
    ) -> SdkResult<ProjectDescriptor> {
        Ok(self.assembler.assemble(storage, hash, self.store.as_ref()).await?)
    }

    /// Source model bytes of a revision, if uploaded.
    pub async fn source_model(&self, project: &Project, hash: &RevisionHash) -> SdkResult<Option<Bytes>> {
        Ok(self.store.get(&project.key(hash, ArtifactKind::SourceModel)).await?)
    }
}

/// Project storage record for a published revision.
///
/// `has_drawings` follows whether the drawing export succeeded.
pub fn storage_for(result: &RevisionResult, is_assembly: bool) -> ProjectStorage {
    ProjectStorage::new(
        result.project.clone(),
        ProjectMetadata {
            hash: result.hash.clone(),
            is_assembly,
            has_drawings: result.artifact(ArtifactKind::Drawing).is_some(),
        },
    )
}

impl std::fmt::Debug for DerivativeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivativeService")
            .field("bucket", &self.store.bucket())
            .field("coordinator", &self.coordinator)
            .field("assembler", &self.assembler)
            .finish()
    }
}
