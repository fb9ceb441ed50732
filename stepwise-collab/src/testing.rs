use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    ai::{AiError, AiService},
    files::{FileStore, FileStoreError},
    Collab, Config, Database, MemoryDatabase, NewUser, PrimaryKey, Profile, Role, UserData,
};

/// A file store that remembers every deletion it was asked to do
#[derive(Default)]
pub struct RecordingFileStore {
    attempts: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingFileStore {
    /// Makes deleting a reference fail from now on
    pub fn fail_on(&self, reference: &str) {
        self.failing.lock().insert(reference.to_string());
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl FileStore for RecordingFileStore {
    async fn delete(&self, reference: &str) -> Result<(), FileStoreError> {
        self.attempts.lock().push(reference.to_string());

        if self.failing.lock().contains(reference) {
            return Err(FileStoreError::Io {
                path: reference.to_string(),
                source: std::io::Error::other("disk on fire"),
            });
        }

        Ok(())
    }
}

/// What [MockAi] does when asked to generate
#[derive(Debug, Clone)]
pub enum Generation {
    Text(String),
    Fail,
    /// Never responds
    Hang,
}

pub struct MockAi {
    generation: Mutex<Generation>,
    requests: Mutex<Vec<(String, String)>>,
    invalidations: Mutex<Vec<PrimaryKey>>,
    fail_invalidation: Mutex<bool>,
}

impl Default for MockAi {
    fn default() -> Self {
        Self {
            generation: Mutex::new(Generation::Text("1. Do the thing".to_string())),
            requests: Default::default(),
            invalidations: Default::default(),
            fail_invalidation: Default::default(),
        }
    }
}

impl MockAi {
    pub fn respond_with(&self, generation: Generation) {
        *self.generation.lock() = generation;
    }

    pub fn fail_invalidation(&self) {
        *self.fail_invalidation.lock() = true;
    }

    /// The base description and profile context of the last generation request
    pub fn last_request(&self) -> Option<(String, String)> {
        self.requests.lock().last().cloned()
    }

    pub fn invalidations(&self) -> Vec<PrimaryKey> {
        self.invalidations.lock().clone()
    }
}

#[async_trait]
impl AiService for MockAi {
    async fn generate(
        &self,
        base_description: &str,
        profile_context: &str,
    ) -> Result<String, AiError> {
        self.requests
            .lock()
            .push((base_description.to_string(), profile_context.to_string()));

        let generation = self.generation.lock().clone();

        match generation {
            Generation::Text(text) => Ok(text),
            Generation::Fail => Err(AiError::Status {
                status: 500,
                body: "model unavailable".to_string(),
            }),
            Generation::Hang => std::future::pending().await,
        }
    }

    async fn invalidate(&self, room_id: PrimaryKey) -> Result<(), AiError> {
        self.invalidations.lock().push(room_id);

        if *self.fail_invalidation.lock() {
            return Err(AiError::Request("connection refused".to_string()));
        }

        Ok(())
    }
}

/// A collab system backed by fakes that tests can inspect
pub struct TestCollab {
    pub collab: Collab,
    pub database: Arc<MemoryDatabase>,
    pub files: Arc<RecordingFileStore>,
    pub ai: Arc<MockAi>,
}

pub fn test_collab() -> TestCollab {
    let database = Arc::new(MemoryDatabase::new());
    let files = Arc::new(RecordingFileStore::default());
    let ai = Arc::new(MockAi::default());

    let config = Config {
        generation_timeout: Duration::from_millis(50),
        invalidation_timeout: Duration::from_millis(50),
    };

    let collab = Collab::new(database.clone(), files.clone(), ai.clone(), config);

    TestCollab {
        collab,
        database,
        files,
        ai,
    }
}

/// Creates a user with a completed registration and no password
pub async fn create_user(t: &TestCollab, username: &str, role: Role) -> UserData {
    t.database
        .create_user(NewUser {
            username: username.to_string(),
            role: Some(role),
            profile: Profile::default(),
            registration_complete: true,
            ..Default::default()
        })
        .await
        .unwrap()
}
