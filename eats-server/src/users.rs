use anyhow::Context;
use eats_common::{UserId, UserProfile};
use sled::{Db, Tree};
use tracing::debug;

use crate::{AppError, Result};

/// Profile documents, one JSON value per user id.
#[derive(Clone)]
pub struct Users {
    tree: Tree,
}

impl Users {
    pub fn new(db: &Db) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("users").context("Error opening users tree")?,
        })
    }

    pub fn user(&self, id: &UserId) -> Result<UserProfile> {
        let raw = self
            .tree
            .get(id.as_ref())?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        Ok(serde_json::from_slice(&raw).with_context(|| format!("Error decoding user {id}"))?)
    }

    /// Stores a fresh profile; fails with `Conflict` when the id is taken.
    pub fn create(&self, profile: &UserProfile) -> Result<()> {
        let encoded = serde_json::to_vec(profile)?;
        match self
            .tree
            .compare_and_swap(profile.id.as_ref(), None as Option<&[u8]>, Some(encoded))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(AppError::Conflict(format!("User {} already exists", profile.id))),
        }
    }

    /// Read-modify-write of one profile. `func` may run more than once when
    /// another writer gets in first, so it must only touch the profile.
    pub fn try_user_mut<R>(&self, id: &UserId, mut func: impl FnMut(&mut UserProfile) -> Result<R>) -> Result<R> {
        loop {
            let current = self
                .tree
                .get(id.as_ref())?
                .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
            let mut profile: UserProfile =
                serde_json::from_slice(&current).with_context(|| format!("Error decoding user {id}"))?;
            let out = func(&mut profile)?;
            let encoded = serde_json::to_vec(&profile)?;
            match self.tree.compare_and_swap(id.as_ref(), Some(current), Some(encoded))? {
                Ok(()) => return Ok(out),
                Err(_) => debug!(user = %id, "Concurrent profile update, retrying"),
            }
        }
    }

    pub fn user_mut(&self, id: &UserId, mut func: impl FnMut(&mut UserProfile)) -> Result<()> {
        self.try_user_mut(id, |profile| {
            func(profile);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Users {
        let db = sled::Config::new().temporary(true).open().unwrap();
        Users::new(&db).unwrap()
    }

    #[test]
    fn create_then_fetch() {
        let users = users();
        let id = UserId("user1".into());
        users.create(&UserProfile::new(id.clone())).unwrap();
        assert_eq!(users.user(&id).unwrap(), UserProfile::new(id.clone()));
        assert!(matches!(
            users.create(&UserProfile::new(id)),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn missing_user_is_not_found() {
        let users = users();
        let id = UserId("nobody".into());
        assert!(matches!(users.user(&id), Err(AppError::NotFound(_))));
        assert!(matches!(
            users.user_mut(&id, |p| p.record_generated("Toast")),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn mutations_persist() {
        let users = users();
        let id = UserId("user2".into());
        users.create(&UserProfile::new(id.clone())).unwrap();
        users.user_mut(&id, |p| p.record_generated("Omelette")).unwrap();
        let failed = users.try_user_mut(&id, |p| Ok(p.add_disliked(" ")?));
        assert!(matches!(failed, Err(AppError::BadRequest(_))));
        assert_eq!(users.user(&id).unwrap().generated_meals, vec!["Omelette".to_string()]);
    }
}
