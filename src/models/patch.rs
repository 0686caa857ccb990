//! Field-level patch values for partial updates.
//!
//! A [`Patch`] distinguishes a field that was not supplied at all from a field
//! that was supplied with a value. For nullable columns the value type is an
//! `Option`, so `Patch::Set(None)` ("clear it") and `Patch::Unset` ("leave it")
//! stay distinct.
//!
//! In a request body, a missing key deserializes to `Unset` (through
//! `#[serde(default)]`) and any present key, including an explicit `null`,
//! deserializes to `Set`.

use sea_orm::ActiveValue;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    /// Field omitted; the stored value is left untouched
    Unset,
    /// Field supplied; the stored value is overwritten
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Patch::Unset)
    }

    /// Borrow the supplied value, if any.
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            Patch::Unset => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> Patch<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Patch::Set(value) => Patch::Set(f(value)),
            Patch::Unset => Patch::Unset,
        }
    }

    /// Resolve against the currently stored value.
    pub fn merged(self, current: T) -> T {
        match self {
            Patch::Set(value) => value,
            Patch::Unset => current,
        }
    }

    /// Convert into a SeaORM active value; unset fields are excluded from the
    /// generated UPDATE statement.
    pub fn into_active_value(self) -> ActiveValue<T>
    where
        T: Into<sea_orm::Value>,
    {
        match self {
            Patch::Set(value) => ActiveValue::Set(value),
            Patch::Unset => ActiveValue::NotSet,
        }
    }
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unset
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

impl<T> Serialize for Patch<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Set(value) => value.serialize(serializer),
            // Callers pair this with `skip_serializing_if = "Patch::is_unset"`
            Patch::Unset => serializer.serialize_none(),
        }
    }
}
