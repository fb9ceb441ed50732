use std::{collections::HashSet, fmt::Display, str::FromStr};

use log::{info, warn};

use crate::{
    ai::bounded,
    effects::{BestEffort, EffectReport},
    files::delete_all,
    CollabContext, PrimaryKey, RoomData, RoomError,
};

/// Which of the two classification image lists of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Normal,
    Abnormal,
}

impl FromStr for ImageKind {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(ImageKind::Normal),
            "abnormal" => Ok(ImageKind::Abnormal),
            other => Err(RoomError::InvalidArgument(format!(
                "Image kind must be \"normal\" or \"abnormal\", got \"{}\"",
                other
            ))),
        }
    }
}

impl Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageKind::Normal => f.write_str("normal"),
            ImageKind::Abnormal => f.write_str("abnormal"),
        }
    }
}

/// Returns the references of `old` that `desired` no longer contains, each once, in order
pub fn orphaned_references(old: &[String], desired: &[String]) -> Vec<String> {
    let kept: HashSet<_> = desired.iter().collect();
    let mut seen = HashSet::new();

    old.iter()
        .filter(|r| !kept.contains(r) && seen.insert(*r))
        .cloned()
        .collect()
}

/// Maintains the classification images of rooms.
///
/// The lists stored on the room are the source of truth. Files on disk
/// follow them on a best-effort basis and may be left orphaned if a deletion fails.
pub struct ImageManager {
    context: CollabContext,
}

impl ImageManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Appends uploaded images to one of the lists of a room
    pub async fn append_images(
        &self,
        room_id: PrimaryKey,
        requester: PrimaryKey,
        kind: &str,
        references: Vec<String>,
    ) -> Result<RoomData, RoomError> {
        let room = self.context.room_owned_by(room_id, requester).await?;
        let kind: ImageKind = kind.parse()?;

        let mut normal = room.normal_images;
        let mut abnormal = room.abnormal_images;

        match kind {
            ImageKind::Normal => normal.extend(references),
            ImageKind::Abnormal => abnormal.extend(references),
        }

        let room = self
            .context
            .database
            .update_room_images(room_id, normal, abnormal)
            .await?;

        info!(
            "Room {} now has {} normal and {} abnormal images",
            room.id,
            room.normal_images.len(),
            room.abnormal_images.len()
        );

        self.invalidate_cache(room_id).await;
        Ok(room)
    }

    /// Replaces both lists of a room, deleting the files of every reference that was dropped.
    ///
    /// A reference moved from one list to the other is still in use and is not deleted.
    pub async fn replace_image_lists(
        &self,
        room_id: PrimaryKey,
        requester: PrimaryKey,
        desired_normal: Vec<String>,
        desired_abnormal: Vec<String>,
    ) -> Result<EffectReport, RoomError> {
        let room = self.context.room_owned_by(room_id, requester).await?;

        let desired: Vec<String> = desired_normal
            .iter()
            .chain(desired_abnormal.iter())
            .cloned()
            .collect();

        let old: Vec<String> = room
            .normal_images
            .into_iter()
            .chain(room.abnormal_images)
            .collect();

        let orphaned = orphaned_references(&old, &desired);

        self.context
            .database
            .update_room_images(room_id, desired_normal, desired_abnormal)
            .await?;

        let report = delete_all(self.context.files.as_ref(), &orphaned).await;

        if !report.failures.is_empty() {
            warn!(
                "{} orphaned images of room {} could not be deleted",
                report.failures.len(),
                room_id
            );
        }

        self.invalidate_cache(room_id).await;
        Ok(report)
    }

    /// Asks the AI service to forget what it cached about a room. Never fails.
    async fn invalidate_cache(&self, room_id: PrimaryKey) {
        let limit = self.context.config.invalidation_timeout;
        let result = bounded(limit, self.context.ai.invalidate(room_id)).await;

        let mut effects = BestEffort::new("invalidate AI cache");
        effects.record(format_args!("room {}", room_id), result);
    }
}
