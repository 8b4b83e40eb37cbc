//! Address book contacts

use crate::address::decode_address;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maximum contact name length
pub const MAX_NAME_LENGTH: usize = 100;

/// Saved contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Unique id
    pub id: String,
    /// Display name
    pub name: String,
    /// Base58 address
    pub address: String,
}

impl Contact {
    /// New contact with a random id
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            address: address.into(),
        }
    }

    /// Validate fields
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidContact("id is empty".to_string()));
        }
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidContact("name is empty".to_string()));
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(Error::InvalidContact(format!(
                "name exceeds {} characters",
                MAX_NAME_LENGTH
            )));
        }
        decode_address(&self.address)?;
        Ok(())
    }
}

/// Contacts of one wallet, unique by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactList {
    contacts: Vec<Contact>,
}

impl ContactList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contact
    pub fn add(&mut self, contact: Contact) -> Result<()> {
        contact.validate()?;
        if self.contacts.iter().any(|c| c.id == contact.id) {
            return Err(Error::DuplicateContact(contact.id));
        }
        self.contacts.push(contact);
        Ok(())
    }

    /// Replace a contact with the same id
    pub fn update(&mut self, contact: Contact) -> Result<()> {
        contact.validate()?;
        let existing = self
            .contacts
            .iter_mut()
            .find(|c| c.id == contact.id)
            .ok_or_else(|| Error::ContactNotFound(contact.id.clone()))?;
        *existing = contact;
        Ok(())
    }

    /// Delete a contact by id
    pub fn delete(&mut self, id: &str) -> Result<Contact> {
        let position = self
            .contacts
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::ContactNotFound(id.to_string()))?;
        Ok(self.contacts.remove(position))
    }

    /// Merge imported contacts, replacing those with a known id
    ///
    /// Invalid contacts abort the whole merge.
    pub fn merge(&mut self, imported: Vec<Contact>) -> Result<usize> {
        for contact in &imported {
            contact.validate()?;
        }
        let count = imported.len();
        for contact in imported {
            match self.contacts.iter_mut().find(|c| c.id == contact.id) {
                Some(existing) => *existing = contact,
                None => self.contacts.push(contact),
            }
        }
        Ok(count)
    }

    /// Contacts whose name or address contains `term`, ignoring case
    pub fn filter(&self, term: &str) -> Vec<&Contact> {
        let term = term.trim().to_lowercase();
        self.contacts
            .iter()
            .filter(|c| {
                term.is_empty()
                    || c.name.to_lowercase().contains(&term)
                    || c.address.to_lowercase().contains(&term)
            })
            .collect()
    }

    /// Contact by id
    pub fn get(&self, id: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == id)
    }

    /// All contacts
    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    /// Number of contacts
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Take the contacts
    pub fn into_vec(self) -> Vec<Contact> {
        self.contacts
    }
}

impl From<Vec<Contact>> for ContactList {
    fn from(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }
}
