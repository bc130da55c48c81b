//! Contact lists: who a user has added to start conversations with.

use std::sync::Arc;

use crate::domain::{Contact, ContactRepository, User, UserRepository};
use crate::shared::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("User not found")]
    UserNotFound,

    #[error("Cannot add yourself as a contact")]
    SelfContact,

    #[error("Contact already added")]
    AlreadyAdded,

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl From<ContactError> for AppError {
    fn from(err: ContactError) -> Self {
        match err {
            ContactError::UserNotFound => AppError::NotFound(err.to_string()),
            ContactError::SelfContact => AppError::BadRequest(err.to_string()),
            ContactError::AlreadyAdded => AppError::Conflict(err.to_string()),
            ContactError::Storage(e) => e,
        }
    }
}

pub struct ContactService {
    users: Arc<dyn UserRepository>,
    contacts: Arc<dyn ContactRepository>,
}

impl ContactService {
    pub fn new(users: Arc<dyn UserRepository>, contacts: Arc<dyn ContactRepository>) -> Self {
        Self { users, contacts }
    }

    /// Add the user named `username` to `owner_id`'s contacts.
    #[tracing::instrument(skip(self))]
    pub async fn add(&self, owner_id: i64, username: &str) -> Result<User, ContactError> {
        let contact = self
            .users
            .find_by_username_or_email(username.trim())
            .await?
            .ok_or(ContactError::UserNotFound)?;

        if contact.id == owner_id {
            return Err(ContactError::SelfContact);
        }
        if !self.contacts.add(owner_id, contact.id).await? {
            return Err(ContactError::AlreadyAdded);
        }

        tracing::debug!(contact_id = contact.id, "Contact added");
        Ok(contact)
    }

    pub async fn list(&self, owner_id: i64) -> Result<Vec<Contact>, ContactError> {
        Ok(self.contacts.list(owner_id).await?)
    }
}
