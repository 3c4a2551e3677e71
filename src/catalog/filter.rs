//! Filter criteria and query construction
//!
//! Criteria come from a form where every field is optional. Building a query
//! drops absent and blank fields entirely, so an empty name box never turns
//! into a "name equals empty string" constraint.

use crate::core::error::{CatalogError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// User-entered filter predicates. `None` means no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub name: Option<String>,
    pub created_date: Option<NaiveDate>,
    pub stock: Option<u32>,
}

impl FilterCriteria {
    /// Parse raw form input; blank fields are treated as absent
    pub fn from_form(name: &str, created_date: &str, stock: &str) -> Result<Self> {
        let name = non_blank(name).map(str::to_string);

        let created_date = non_blank(created_date)
            .map(|raw| {
                NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
                    CatalogError::Validation(format!(
                        "Created date must be formatted as YYYY-MM-DD, got '{}'",
                        raw
                    ))
                })
            })
            .transpose()?;

        let stock = non_blank(stock)
            .map(|raw| {
                raw.parse::<u32>().map_err(|_| {
                    CatalogError::Validation(format!(
                        "Stock must be a non-negative whole number, got '{}'",
                        raw
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            name,
            created_date,
            stock,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_created_date(mut self, date: NaiveDate) -> Self {
        self.created_date = Some(date);
        self
    }

    pub fn with_stock(mut self, stock: u32) -> Self {
        self.stock = Some(stock);
        self
    }

    /// The all-absent criteria, restoring the unfiltered view
    pub fn reset() -> Self {
        Self::default()
    }
}

fn non_blank(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Canonical request payload for a filtered fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterQuery {
    #[serde(rename = "productname", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "createdDate",
        skip_serializing_if = "Option::is_none",
        with = "date_format"
    )]
    #[serde(default)]
    pub created_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
}

impl FilterQuery {
    /// Keep only present, non-empty fields
    pub fn build(criteria: &FilterCriteria) -> Self {
        Self {
            name: criteria
                .name
                .as_deref()
                .and_then(non_blank)
                .map(str::to_string),
            created_date: criteria.created_date,
            stock: criteria.stock,
        }
    }

    /// True when the query constrains nothing and is equivalent to listing everything
    pub fn is_unconstrained(&self) -> bool {
        self.name.is_none() && self.created_date.is_none() && self.stock.is_none()
    }

    /// Key/value pairs in a fixed order, as sent on the wire
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(name) = &self.name {
            pairs.push(("productname", name.clone()));
        }
        if let Some(date) = &self.created_date {
            pairs.push(("createdDate", date.format(DATE_FORMAT).to_string()));
        }
        if let Some(stock) = self.stock {
            pairs.push(("stock", stock.to_string()));
        }
        pairs
    }
}

mod date_format {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => serializer.serialize_str(&date.format(DATE_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|raw| {
            NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
