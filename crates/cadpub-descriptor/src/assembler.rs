use std::collections::BTreeSet;
use std::sync::Arc;

use cadpub_cache::LocalArtifactCache;
use cadpub_store::ObjectStore;
use cadpub_types::{ArtifactKind, Project, RevisionHash, Surface};
use tracing::{debug, warn};

use crate::dto::{ProjectDescriptor, ProjectStorage};
use crate::error::{DescriptorError, DescriptorResult};
use crate::links::LinkContext;
use crate::messages::{warning_texts, AdoptionMessage};

/// Builds [`ProjectDescriptor`]s from the cache, the object store and a
/// [`LinkContext`].
pub struct DescriptorAssembler {
    cache: Arc<LocalArtifactCache>,
    links: LinkContext,
    mandatory_kinds: BTreeSet<ArtifactKind>,
}

impl DescriptorAssembler {
    /// Create an assembler. Fails if the link settings are invalid.
    pub fn new(
        cache: Arc<LocalArtifactCache>,
        links: LinkContext,
        mandatory_kinds: impl IntoIterator<Item = ArtifactKind>,
    ) -> DescriptorResult<Self> {
        links.validate()?;
        Ok(Self {
            cache,
            links,
            mandatory_kinds: mandatory_kinds.into_iter().collect(),
        })
    }

    pub fn links(&self) -> &LinkContext {
        &self.links
    }

    /// Descriptor of the project's current revision.
    pub async fn to_descriptor(
        &self,
        storage: &ProjectStorage,
        store: &dyn ObjectStore,
    ) -> DescriptorResult<ProjectDescriptor> {
        self.assemble(storage, &storage.metadata.hash, store).await
    }

    /// Descriptor of revision `hash` of the project.
    ///
    /// Fails with [`DescriptorError::IncompleteRevision`] if a mandatory
    /// kind is not published. A cached copy alone does not count.
    pub async fn assemble(
        &self,
        storage: &ProjectStorage,
        hash: &RevisionHash,
        store: &dyn ObjectStore,
    ) -> DescriptorResult<ProjectDescriptor> {
        let project = &storage.project;
        for &kind in &self.mandatory_kinds {
            let key = project.key(hash, kind);
            if !store.exists(&key).await? {
                return Err(DescriptorError::IncompleteRevision { kind, key });
            }
        }

        let image = match self.surface(project, hash, ArtifactKind::Thumbnail, store).await? {
            Some(image) => Some(image),
            None => self.inline(&project.thumbnail_storage_key(), store).await?,
        };
        let obj_download_url = match self.surface(project, hash, ArtifactKind::Mesh, store).await? {
            Some(url) => Some(self.links.deep_link(&url)?),
            None => None,
        };

        let descriptor = ProjectDescriptor {
            id: project.name().to_string(),
            label: project.label(),
            hash: hash.to_string(),
            image,
            svf: self.surface(project, hash, ArtifactKind::Svf, store).await?,
            model_download_url: self.surface(project, hash, ArtifactKind::SourceModel, store).await?,
            obj_download_url,
            bom_download_url: self.surface(project, hash, ArtifactKind::Bom, store).await?,
            bom_json_url: self.surface(project, hash, ArtifactKind::BomJson, store).await?,
            drawing_url: self.surface(project, hash, ArtifactKind::Drawing, store).await?,
            drawings_list_url: self
                .surface(project, hash, ArtifactKind::DrawingsList, store)
                .await?,
            is_assembly: storage.metadata.is_assembly,
            has_drawing: storage.metadata.has_drawings,
            adopt_warnings: self.adopt_warnings(project, hash, store).await?,
        };
        debug!(project = %project, hash = %hash, "descriptor assembled");
        Ok(descriptor)
    }

    /// Reference to one artifact, according to its kind's surface.
    async fn surface(
        &self,
        project: &Project,
        hash: &RevisionHash,
        kind: ArtifactKind,
        store: &dyn ObjectStore,
    ) -> DescriptorResult<Option<String>> {
        let key = project.key(hash, kind);
        match kind.surface() {
            Surface::Inline => self.inline(&key, store).await,
            Surface::Link => self.link(&key, store).await,
            Surface::Embedded => Ok(None),
        }
    }

    /// Cached: inline reference. Published: signed link. Otherwise `None`.
    async fn inline(&self, key: &str, store: &dyn ObjectStore) -> DescriptorResult<Option<String>> {
        match self.cache.get(key).await? {
            Some(entry) => {
                let reference = self.cache.to_inline_reference(&entry).await?;
                Ok(Some(self.links.resolve(&reference)?))
            }
            None => self.link(key, store).await,
        }
    }

    async fn link(&self, key: &str, store: &dyn ObjectStore) -> DescriptorResult<Option<String>> {
        if !store.exists(key).await? {
            return Ok(None);
        }
        Ok(Some(store.signed_url(key, self.links.signed_url_ttl()).await?))
    }

    async fn adopt_warnings(
        &self,
        project: &Project,
        hash: &RevisionHash,
        store: &dyn ObjectStore,
    ) -> DescriptorResult<Vec<String>> {
        let key = project.key(hash, ArtifactKind::AdoptMessages);
        let Some(entry) = self.cache.get_or_fetch(&key, store).await? else {
            return Ok(Vec::new());
        };
        let data = self.cache.read(&entry).await?;
        match serde_json::from_slice::<Vec<AdoptionMessage>>(&data) {
            Ok(messages) => Ok(warning_texts(&messages)),
            Err(e) => {
                warn!(key = %key, error = %e, "ignoring malformed adoption messages");
                Ok(Vec::new())
            }
        }
    }
}

impl std::fmt::Debug for DescriptorAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorAssembler")
            .field("links", &self.links)
            .field("mandatory_kinds", &self.mandatory_kinds)
            .finish()
    }
}
