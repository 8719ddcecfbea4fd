//! Form validation for the registration, login and cafe-entry forms.
//!
//! Submissions deserialise leniently (missing fields become empty strings) so
//! that every problem is reported per field instead of rejecting the request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::models::{NewCafe, NewUser};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_URL: &str = "Invalid URL.";

/// Error messages keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<&'static str>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: &'static str) {
        self.0.entry(field).or_default().push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[&'static str]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    fn require(&mut self, field: &'static str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.add(field, REQUIRED);
            false
        } else {
            true
        }
    }

    fn require_url(&mut self, field: &'static str, value: &str) {
        if self.require(field, value) && !is_valid_url(value) {
            self.add(field, INVALID_URL);
        }
    }

    fn finish<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<NewUser, FieldErrors> {
        let mut errors = FieldErrors::default();
        errors.require("name", &self.name);
        errors.require("email", &self.email);
        errors.require("password", &self.password);
        errors.finish(NewUser {
            name: self.name.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<Credentials, FieldErrors> {
        let mut errors = FieldErrors::default();
        errors.require("email", &self.email);
        errors.require("password", &self.password);
        errors.finish(Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CafeForm {
    pub name: String,
    pub map_url: String,
    pub img_url: String,
    pub location: String,
    pub seats: String,
    pub has_toilet: Option<String>,
    pub has_wifi: Option<String>,
    pub has_sockets: Option<String>,
    pub can_take_calls: Option<String>,
    pub coffee_price: String,
}

impl CafeForm {
    pub fn validate(&self, author_id: Option<i64>) -> Result<NewCafe, FieldErrors> {
        let mut errors = FieldErrors::default();
        errors.require("name", &self.name);
        errors.require_url("map_url", &self.map_url);
        errors.require_url("img_url", &self.img_url);
        errors.require("location", &self.location);
        errors.require("seats", &self.seats);
        errors.require("coffee_price", &self.coffee_price);
        errors.finish(NewCafe {
            name: self.name.clone(),
            map_url: self.map_url.clone(),
            img_url: self.img_url.clone(),
            location: self.location.clone(),
            seats: self.seats.clone(),
            has_toilet: is_checked(self.has_toilet.as_deref()),
            has_wifi: is_checked(self.has_wifi.as_deref()),
            has_sockets: is_checked(self.has_sockets.as_deref()),
            can_take_calls: is_checked(self.can_take_calls.as_deref()),
            coffee_price: Some(self.coffee_price.clone()),
            author_id,
        })
    }
}

/// Browsers send a checkbox only when it is ticked; an empty or `false` value
/// still counts as unticked.
fn is_checked(value: Option<&str>) -> bool {
    value.is_some_and(|raw| {
        let raw = raw.trim();
        !raw.is_empty() && !raw.eq_ignore_ascii_case("false")
    })
}

/// Absolute URL with a host; domain hosts need a top-level domain.
fn is_valid_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    match url.host() {
        Some(Host::Ipv4(_) | Host::Ipv6(_)) => true,
        Some(Host::Domain(domain)) => match domain.rsplit_once('.') {
            Some((head, tld)) => {
                !head.is_empty() && !tld.is_empty() && !tld.chars().all(|c| c.is_ascii_digit())
            }
            None => false,
        },
        None => false,
    }
}
