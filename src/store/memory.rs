use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{now, CredentialStore, LogObserver, Repository, StoreError, UserObserver};
use crate::{
    internships::{
        repo_types::{Internship, InternshipPatch, NewInternship},
        Internships,
    },
    users::{
        repo::{hash_optional, prepare_insert},
        repo_types::{InvitationUpsert, NewUser, User, UserDetails, UserInsert, UserPatch},
        Users,
    },
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    internships: BTreeMap<i64, Internship>,
    next_user: i64,
    next_internship: i64,
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id) != except)
    }
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
    observer: Arc<dyn UserObserver>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_observer(Arc::new(LogObserver))
    }
}

impl MemoryStore {
    pub fn with_observer(observer: Arc<dyn UserObserver>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            observer,
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Rewrites a pending invitation's expiry.
    pub fn set_token_expiration(&self, user_id: i64, at: OffsetDateTime) {
        if let Some(u) = self.tables().users.get_mut(&user_id) {
            u.token_expiration = Some(at);
        }
    }

    pub fn user(&self, user_id: i64) -> Option<User> {
        self.tables().users.get(&user_id).cloned()
    }

    fn saved(&self, user: User) -> User {
        self.observer.user_saved(&user.details());
        user
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim();
        Ok(self
            .tables()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert(&self, user: UserInsert) -> Result<User, StoreError> {
        let row = {
            let mut t = self.tables();
            if t.email_taken(&user.email, None) {
                return Err(StoreError::Conflict("User already exists".into()));
            }
            t.next_user += 1;
            let ts = now();
            let row = User {
                id: t.next_user,
                first_name: user.first_name,
                last_name: user.last_name,
                email: user.email,
                phone: user.phone,
                address: user.address,
                password_hash: user.password_hash,
                role: user.role,
                invitation_token: None,
                invitation_created_at: None,
                token_expiration: None,
                created_at: ts,
                updated_at: ts,
            };
            t.users.insert(row.id, row.clone());
            row
        };
        Ok(self.saved(row))
    }

    async fn upsert_invitation(&self, invite: InvitationUpsert) -> Result<User, StoreError> {
        let row = {
            let mut t = self.tables();
            let existing = t
                .users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(&invite.email))
                .map(|u| u.id);
            let ts = now();
            let id = match existing {
                Some(id) => id,
                None => {
                    t.next_user += 1;
                    t.next_user
                }
            };
            let previous = t.users.get(&id).cloned();
            let row = User {
                id,
                first_name: invite.first_name,
                last_name: invite.last_name,
                email: invite.email,
                phone: invite.phone.or_else(|| previous.as_ref().and_then(|p| p.phone.clone())),
                address: invite
                    .address
                    .or_else(|| previous.as_ref().and_then(|p| p.address.clone())),
                password_hash: previous.as_ref().and_then(|p| p.password_hash.clone()),
                role: invite.role,
                invitation_token: Some(invite.token),
                invitation_created_at: Some(invite.created_at),
                token_expiration: Some(invite.expires_at),
                created_at: previous.as_ref().map_or(ts, |p| p.created_at),
                updated_at: ts,
            };
            t.users.insert(id, row.clone());
            row
        };
        Ok(self.saved(row))
    }

    async fn find_by_invitation_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables()
            .users
            .values()
            .find(|u| u.invitation_token.as_deref() == Some(token))
            .cloned())
    }

    async fn complete_invitation(
        &self,
        user_id: i64,
        token: &str,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        let row = {
            let mut t = self.tables();
            let user = t
                .users
                .get_mut(&user_id)
                .filter(|u| u.invitation_token.as_deref() == Some(token))
                .ok_or(StoreError::NotFound)?;
            user.set_password_hash(password_hash.to_string());
            user.updated_at = now();
            user.clone()
        };
        Ok(self.saved(row))
    }

    async fn search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UserDetails>, i64), StoreError> {
        let needle = query.to_lowercase();
        let t = self.tables();
        let hits: Vec<&User> = t
            .users
            .values()
            .filter(|u| {
                [&u.first_name, &u.last_name, &u.email]
                    .iter()
                    .any(|f| f.to_lowercase().contains(&needle))
            })
            .collect();
        let total = hits.len() as i64;
        let page = hits
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(User::details)
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl Repository<Users> for MemoryStore {
    async fn list(&self) -> Result<Vec<UserDetails>, StoreError> {
        Ok(self.tables().users.values().map(User::details).collect())
    }

    async fn get(&self, id: i64) -> Result<UserDetails, StoreError> {
        self.tables()
            .users
            .get(&id)
            .map(User::details)
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, new: NewUser) -> Result<UserDetails, StoreError> {
        let insert = prepare_insert(new).await?;
        Ok(self.insert(insert).await?.details())
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<UserDetails, StoreError> {
        let password_hash = hash_optional(patch.password.clone()).await?;
        let row = {
            let mut t = self.tables();
            let mut user = t.users.get(&id).cloned().ok_or(StoreError::NotFound)?;
            patch.apply(&mut user);
            if t.email_taken(&user.email, Some(id)) {
                return Err(StoreError::Conflict("User already exists".into()));
            }
            if let Some(hash) = password_hash {
                user.set_password_hash(hash);
            }
            user.updated_at = now();
            t.users.insert(id, user.clone());
            user
        };
        Ok(self.saved(row).details())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        {
            let mut t = self.tables();
            t.users.remove(&id).ok_or(StoreError::NotFound)?;
            t.internships.retain(|_, i| i.user_id != id);
        }
        self.observer.user_deleted(id);
        Ok(())
    }
}

#[async_trait]
impl Repository<Internships> for MemoryStore {
    async fn list(&self) -> Result<Vec<Internship>, StoreError> {
        Ok(self.tables().internships.values().cloned().collect())
    }

    async fn get(&self, id: i64) -> Result<Internship, StoreError> {
        self.tables()
            .internships
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, new: NewInternship) -> Result<Internship, StoreError> {
        let new = new
            .into_insert()
            .ok_or_else(|| StoreError::Other(anyhow::anyhow!("unvalidated internship payload")))?;
        let mut t = self.tables();
        if !t.users.contains_key(&new.user_id) {
            return Err(StoreError::MissingReference("User not found".into()));
        }
        t.next_internship += 1;
        let ts = now();
        let row = Internship {
            id: t.next_internship,
            user_id: new.user_id,
            company_name: new.company_name,
            start_date: new.start_date,
            end_date: new.end_date,
            mentor_name: new.mentor_name,
            created_at: ts,
            updated_at: ts,
        };
        t.internships.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, id: i64, patch: InternshipPatch) -> Result<Internship, StoreError> {
        let mut t = self.tables();
        let mut row = t.internships.get(&id).cloned().ok_or(StoreError::NotFound)?;
        let errors = patch.apply(&mut row);
        if !errors.is_empty() {
            return Err(StoreError::Invalid(errors));
        }
        if !t.users.contains_key(&row.user_id) {
            return Err(StoreError::MissingReference("User not found".into()));
        }
        row.updated_at = now();
        t.internships.insert(id, row.clone());
        Ok(row)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.tables()
            .internships
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Role;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl UserObserver for Recorder {
        fn user_saved(&self, user: &UserDetails) {
            self.events.lock().unwrap().push(format!("saved:{}", user.id));
        }
        fn user_deleted(&self, user_id: i64) {
            self.events.lock().unwrap().push(format!("deleted:{}", user_id));
        }
    }

    fn insert(email: &str) -> UserInsert {
        UserInsert {
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: email.into(),
            phone: None,
            address: None,
            password_hash: None,
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn observer_sees_every_committed_write() {
        let recorder = Arc::new(Recorder::default());
        let store = MemoryStore::with_observer(recorder.clone());
        let user = store.insert(insert("ann@example.com")).await.unwrap();
        Repository::<Users>::delete(&store, user.id).await.unwrap();
        assert!(store.insert(insert("ann@example.com")).await.is_ok());
        assert!(Repository::<Users>::delete(&store, 999).await.is_err());

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["saved:1", "deleted:1", "saved:2"]);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_case_insensitively() {
        let store = MemoryStore::default();
        store.insert(insert("ann@example.com")).await.unwrap();
        let err = store.insert(insert("ANN@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
