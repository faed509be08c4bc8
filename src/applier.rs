use tracing::{debug, info, warn};

use crate::config::{AppConfig, ApprovalConfig, AutoCreationConfig, TaggingConfig};
use crate::paperless::{
    find_by_name, DocumentService, DocumentUpdate, NamedEntity, PaperlessResult, Tag,
};
use crate::pipeline::{ProcessingResult, SuggestedMetadata};

pub const PROCESSING_TAG_COLOR: &str = "#4caf50";
pub const PENDING_TAG_COLOR: &str = "#ff9800";

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied { update: DocumentUpdate },
    Staged { pending_tag_attached: bool },
}

#[derive(Debug, Clone, Copy)]
enum EntityKind {
    Correspondent,
    DocumentType,
}

impl EntityKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Correspondent => "correspondent",
            Self::DocumentType => "document type",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetadataApplier {
    auto_creation: AutoCreationConfig,
    tagging: TaggingConfig,
    approval: ApprovalConfig,
}

impl MetadataApplier {
    pub fn new(
        auto_creation: AutoCreationConfig,
        tagging: TaggingConfig,
        approval: ApprovalConfig,
    ) -> Self {
        Self {
            auto_creation,
            tagging,
            approval,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.auto_creation.clone(),
            config.tagging.clone(),
            config.approval.clone(),
        )
    }

    pub async fn apply(
        &self,
        service: &dyn DocumentService,
        result: &ProcessingResult,
    ) -> PaperlessResult<ApplyOutcome> {
        if result.approval_mode {
            let pending_tag_attached = self.stage_for_approval(service, result.document_id).await;
            return Ok(ApplyOutcome::Staged {
                pending_tag_attached,
            });
        }

        let update = self
            .apply_direct(service, result.document_id, &result.suggested)
            .await?;
        Ok(ApplyOutcome::Applied { update })
    }

    /// Resolves or creates the suggested entities, unions the tag ids with
    /// the document's current tags and sends one partial update.
    pub async fn apply_direct(
        &self,
        service: &dyn DocumentService,
        document_id: i64,
        suggested: &SuggestedMetadata,
    ) -> PaperlessResult<DocumentUpdate> {
        let document = service.get_document(document_id).await?;
        let mut update = DocumentUpdate {
            title: suggested
                .title
                .as_deref()
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .map(str::to_string),
            created: suggested.document_date.clone(),
            ..DocumentUpdate::default()
        };

        update.correspondent = self
            .resolve_entity(
                service,
                EntityKind::Correspondent,
                suggested.correspondent.as_deref(),
                suggested.correspondent_id,
                self.auto_creation.correspondents,
            )
            .await?;
        update.document_type = self
            .resolve_entity(
                service,
                EntityKind::DocumentType,
                suggested.document_type.as_deref(),
                suggested.document_type_id,
                self.auto_creation.document_types,
            )
            .await?;

        let mut tag_ids = document.tags.clone();
        for id in &suggested.tag_ids {
            push_unique(&mut tag_ids, *id);
        }
        if self.auto_creation.tags && !suggested.new_tags.is_empty() {
            let mut known = service.get_tags().await?;
            for name in &suggested.new_tags {
                let tag = find_or_create_tag(service, &mut known, name, None).await?;
                push_unique(&mut tag_ids, tag.id);
            }
        }
        if self.tagging.processing_tag_enabled {
            let mut known = service.get_tags().await?;
            let tag = find_or_create_tag(
                service,
                &mut known,
                &self.tagging.processing_tag,
                Some(PROCESSING_TAG_COLOR),
            )
            .await?;
            push_unique(&mut tag_ids, tag.id);
        }
        if tag_ids != document.tags {
            update.tags = Some(tag_ids);
        }

        if update.is_empty() {
            debug!(document_id, "no metadata changes to apply");
        } else {
            service.update_document(document_id, &update).await?;
            info!(
                document_id,
                title = update.title.is_some(),
                correspondent = ?update.correspondent,
                document_type = ?update.document_type,
                tags = update.tags.as_ref().map(Vec::len),
                "applied metadata"
            );
        }
        Ok(update)
    }

    pub async fn stage_for_approval(&self, service: &dyn DocumentService, document_id: i64) -> bool {
        match self.attach_pending_tag(service, document_id).await {
            Ok(()) => {
                info!(document_id, tag = %self.approval.pending_tag, "staged suggestions for approval");
                true
            }
            Err(err) => {
                warn!(document_id, error = %err, "failed to attach approval-pending tag");
                false
            }
        }
    }

    pub async fn approve(
        &self,
        service: &dyn DocumentService,
        document_id: i64,
        suggested: &SuggestedMetadata,
    ) -> PaperlessResult<DocumentUpdate> {
        let update = self.apply_direct(service, document_id, suggested).await?;
        if let Err(err) = self.clear_pending_tag(service, document_id).await {
            warn!(document_id, error = %err, "failed to remove approval-pending tag");
        }
        Ok(update)
    }

    pub async fn reject(&self, service: &dyn DocumentService, document_id: i64) {
        if let Err(err) = self.clear_pending_tag(service, document_id).await {
            warn!(document_id, error = %err, "failed to remove approval-pending tag");
        }
    }

    pub async fn clear_pending_tag(
        &self,
        service: &dyn DocumentService,
        document_id: i64,
    ) -> PaperlessResult<()> {
        let tags = service.get_tags().await?;
        let Some(pending) = find_by_name(&tags, &self.approval.pending_tag) else {
            return Ok(());
        };
        let document = service.get_document(document_id).await?;
        if !document.tags.contains(&pending.id) {
            return Ok(());
        }
        let remaining: Vec<i64> = document
            .tags
            .iter()
            .copied()
            .filter(|id| *id != pending.id)
            .collect();
        let update = DocumentUpdate {
            tags: Some(remaining),
            ..DocumentUpdate::default()
        };
        service.update_document(document_id, &update).await?;
        Ok(())
    }

    async fn attach_pending_tag(
        &self,
        service: &dyn DocumentService,
        document_id: i64,
    ) -> PaperlessResult<()> {
        let mut known = service.get_tags().await?;
        let pending = find_or_create_tag(
            service,
            &mut known,
            &self.approval.pending_tag,
            Some(PENDING_TAG_COLOR),
        )
        .await?;
        let document = service.get_document(document_id).await?;
        if document.tags.contains(&pending.id) {
            return Ok(());
        }
        let mut tags = document.tags;
        tags.push(pending.id);
        let update = DocumentUpdate {
            tags: Some(tags),
            ..DocumentUpdate::default()
        };
        service.update_document(document_id, &update).await?;
        Ok(())
    }

    async fn resolve_entity(
        &self,
        service: &dyn DocumentService,
        kind: EntityKind,
        name: Option<&str>,
        id: Option<i64>,
        auto_create: bool,
    ) -> PaperlessResult<Option<i64>> {
        if id.is_some() {
            return Ok(id);
        }
        let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) else {
            return Ok(None);
        };
        if !auto_create {
            debug!(kind = kind.as_str(), name, "auto-creation disabled; leaving unset");
            return Ok(None);
        }

        // A staged suggestion may point at an entity created since it was made.
        let existing: Vec<NamedEntity> = match kind {
            EntityKind::Correspondent => service.get_correspondents().await?,
            EntityKind::DocumentType => service.get_document_types().await?,
        };
        if let Some(entity) = find_by_name(&existing, name) {
            return Ok(Some(entity.id));
        }

        let created = match kind {
            EntityKind::Correspondent => service.create_correspondent(name).await?,
            EntityKind::DocumentType => service.create_document_type(name).await?,
        };
        info!(kind = kind.as_str(), name, id = created.id, "created entity");
        Ok(Some(created.id))
    }
}

pub async fn find_or_create_tag(
    service: &dyn DocumentService,
    known: &mut Vec<Tag>,
    name: &str,
    color: Option<&str>,
) -> PaperlessResult<Tag> {
    if let Some(tag) = find_by_name(known, name) {
        return Ok(tag.clone());
    }
    let tag = service.create_tag(name, color).await?;
    info!(tag = %tag.name, id = tag.id, "created tag");
    known.push(tag.clone());
    Ok(tag)
}

fn push_unique(ids: &mut Vec<i64>, id: i64) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_unique_keeps_order_and_skips_duplicates() {
        let mut ids = vec![3, 1];
        push_unique(&mut ids, 1);
        push_unique(&mut ids, 7);
        push_unique(&mut ids, 3);
        assert_eq!(ids, vec![3, 1, 7]);
    }
}
