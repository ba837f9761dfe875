//! User business logic - lookups and tax profile maintenance.
//!
//! The ledger never owns users; it only needs to find them by email and read
//! the fields that end up on tax documents.

use crate::{
    core::UserId,
    entities::{User, user},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Entity types that file as a business rather than an individual.
const BUSINESS_ENTITY_TYPES: [&str; 3] = ["business", "corporation", "llc"];

/// Arguments for registering a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login email
    pub email: UserId,
    /// Legal name
    pub full_name: String,
    /// `"individual"`, `"business"`, `"corporation"` or `"llc"`
    pub entity_type: String,
}

/// Tax mailing address printed on documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxAddress {
    /// Street line
    pub street_address: String,
    /// City
    pub city: String,
    /// State
    pub state: String,
    /// ZIP code
    pub zip_code: String,
    /// Country, `"US"` when not recorded
    pub country: String,
}

/// Tax identification details a payee supplies before payouts can be reported.
#[derive(Debug, Clone, Default)]
pub struct TaxProfile {
    /// Business name, if renting out gear as a company
    pub business_name: Option<String>,
    /// SSN or EIN
    pub tax_id_number: Option<String>,
    /// `"ssn"` or `"ein"`
    pub tax_id_type: Option<String>,
    /// Mailing address for tax documents
    pub tax_address: Option<TaxAddress>,
    /// Entity type override
    pub entity_type: Option<String>,
    /// `"email"` or `"mail"`
    pub tax_document_delivery: Option<String>,
}

/// Registers a user.
pub async fn create_user(db: &DatabaseConnection, new_user: NewUser) -> Result<user::Model> {
    if new_user.email.as_str().is_empty() {
        return Err(Error::InvalidEmail {
            email: new_user.email.to_string(),
        });
    }

    if get_user_by_email(db, &new_user.email).await?.is_some() {
        return Err(Error::UserAlreadyExists {
            email: new_user.email.to_string(),
        });
    }

    let now = Utc::now();
    let model = user::ActiveModel {
        email: Set(new_user.email.to_string()),
        full_name: Set(new_user.full_name),
        entity_type: Set(new_user.entity_type),
        business_name: Set(None),
        tax_id_number: Set(None),
        tax_id_type: Set(None),
        tax_street_address: Set(None),
        tax_city: Set(None),
        tax_state: Set(None),
        tax_zip_code: Set(None),
        tax_country: Set(None),
        tax_document_delivery: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    model.insert(db).await.map_err(Into::into)
}

/// Finds a user by email, returning None if no account exists.
pub async fn get_user_by_email<C>(db: &C, email: &UserId) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists every user ordered by email.
pub async fn get_all_users(db: &DatabaseConnection) -> Result<Vec<user::Model>> {
    User::find()
        .order_by_asc(user::Column::Email)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Stores a user's tax identification details. Fields left as `None` keep
/// their current value.
#[instrument(skip(db, profile))]
pub async fn update_tax_profile(
    db: &DatabaseConnection,
    email: &UserId,
    profile: TaxProfile,
) -> Result<user::Model> {
    let existing = get_user_by_email(db, email)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            email: email.to_string(),
        })?;

    let mut active: user::ActiveModel = existing.into();
    if let Some(business_name) = profile.business_name {
        active.business_name = Set(Some(business_name));
    }
    if let Some(tax_id_number) = profile.tax_id_number {
        active.tax_id_number = Set(Some(tax_id_number));
    }
    if let Some(tax_id_type) = profile.tax_id_type {
        active.tax_id_type = Set(Some(tax_id_type));
    }
    if let Some(address) = profile.tax_address {
        active.tax_street_address = Set(Some(address.street_address));
        active.tax_city = Set(Some(address.city));
        active.tax_state = Set(Some(address.state));
        active.tax_zip_code = Set(Some(address.zip_code));
        active.tax_country = Set(Some(address.country));
    }
    if let Some(entity_type) = profile.entity_type {
        active.entity_type = Set(entity_type);
    }
    if let Some(delivery) = profile.tax_document_delivery {
        active.tax_document_delivery = Set(Some(delivery));
    }
    active.updated_at = Set(Utc::now());

    debug!("Updating tax profile for {}", email);
    active.update(db).await.map_err(Into::into)
}

/// The user's tax mailing address, if every required line is on file.
#[must_use]
pub fn tax_address(user: &user::Model) -> Option<TaxAddress> {
    Some(TaxAddress {
        street_address: user.tax_street_address.clone()?,
        city: user.tax_city.clone()?,
        state: user.tax_state.clone()?,
        zip_code: user.tax_zip_code.clone()?,
        country: user
            .tax_country
            .clone()
            .unwrap_or_else(|| "US".to_string()),
    })
}

/// Whether the user has supplied both a TIN and a complete tax address.
#[must_use]
pub fn has_tax_info(user: &user::Model) -> bool {
    user.tax_id_number
        .as_deref()
        .is_some_and(|tin| !tin.trim().is_empty())
        && tax_address(user).is_some()
}

/// Whether the user has stored any tax identification data at all.
#[must_use]
pub fn has_any_tax_data(user: &user::Model) -> bool {
    user.tax_id_number.is_some() || user.tax_street_address.is_some()
}

/// Whether an entity type files as a business.
#[must_use]
pub fn is_business_entity(entity_type: &str) -> bool {
    BUSINESS_ENTITY_TYPES
        .iter()
        .any(|kind| kind.eq_ignore_ascii_case(entity_type.trim()))
}
