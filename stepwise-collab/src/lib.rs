pub mod ai;
mod auth;
mod config;
mod db;
mod describe;
pub mod effects;
pub mod files;
mod points;
mod rooms;
mod util;

#[cfg(test)]
mod testing;

pub use auth::*;
pub use config::*;
pub use db::*;
pub use describe::*;
pub use points::*;
pub use rooms::*;

use ai::SharedAiService;
use files::SharedFileStore;

/// The stepwise collab system, facilitating rooms, their instructions, authentication, and more.
pub struct Collab {
    pub auth: Auth,
    pub rooms: RoomManager,
    pub images: ImageManager,
    pub points: PointsLedger,
    pub descriptions: DescriptionGenerator,
}

/// A type passed to various components of the collab system, to access state and collaborators.
#[derive(Clone)]
pub struct CollabContext {
    pub database: SharedDatabase,
    pub files: SharedFileStore,
    pub ai: SharedAiService,
    pub config: Config,
}

impl Collab {
    pub fn new(
        database: SharedDatabase,
        files: SharedFileStore,
        ai: SharedAiService,
        config: Config,
    ) -> Self {
        let context = CollabContext {
            database,
            files,
            ai,
            config,
        };

        Self {
            auth: Auth::new(&context.database),
            rooms: RoomManager::new(&context),
            images: ImageManager::new(&context),
            points: PointsLedger::new(&context),
            descriptions: DescriptionGenerator::new(&context),
        }
    }
}

impl CollabContext {
    /// Returns a room if `requester` created it
    pub async fn room_owned_by(
        &self,
        room_id: PrimaryKey,
        requester: PrimaryKey,
    ) -> std::result::Result<RoomData, RoomError> {
        let room = self.database.room_by_id(room_id).await?;

        if !room.is_creator(requester) {
            return Err(RoomError::NotCreator);
        }

        Ok(room)
    }
}
