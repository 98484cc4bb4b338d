//! Grounded on `app/models/user.py`.

use crate::models::User;
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use uuid::Uuid;

#[derive(Clone)]
pub struct UserStore {
    collection: Collection<User>,
}

impl UserStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("users"),
        }
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.collection.find_one(doc! { "_id": id.to_string() }).await?)
    }

    pub async fn find_by_unique_name(&self, unique_name: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .collection
            .find_one(doc! { "unique_name": unique_name })
            .await?)
    }

    /// Returns `Conflict` territory to the caller: registration fails if
    /// the handle is already taken.
    pub async fn create(&self, user: &User) -> anyhow::Result<()> {
        self.collection.insert_one(user).await?;
        Ok(())
    }

    /// Implicit registration on first authorization-code redemption for a
    /// vessel, when the named user doesn't exist yet.
    pub async fn get_or_create(&self, user: User) -> anyhow::Result<User> {
        if let Some(existing) = self.find_by_unique_name(&user.unique_name).await? {
            return Ok(existing);
        }
        self.create(&user).await?;
        Ok(user)
    }
}
