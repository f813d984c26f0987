use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An optional declaration field.
///
/// `Unset` means the field was omitted (or `null`); `Value("")` is an
/// explicitly empty value and is kept distinct from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Setting<T> {
  Unset,
  Value(T),
}

impl<T> Default for Setting<T> {
  fn default() -> Self {
    Setting::Unset
  }
}

impl<T> Setting<T> {
  pub fn is_unset(&self) -> bool {
    matches!(self, Setting::Unset)
  }

  pub fn value(&self) -> Option<&T> {
    match self {
      Setting::Unset => None,
      Setting::Value(v) => Some(v),
    }
  }

  pub fn into_option(self) -> Option<T> {
    self.into()
  }
}

impl Setting<String> {
  pub fn as_deref(&self) -> Option<&str> {
    self.value().map(String::as_str)
  }

  /// The value, if one was given and it is not empty.
  pub fn non_empty(&self) -> Option<&str> {
    self.as_deref().filter(|v| !v.is_empty())
  }
}

impl<T> From<Option<T>> for Setting<T> {
  fn from(value: Option<T>) -> Self {
    match value {
      Some(v) => Setting::Value(v),
      None => Setting::Unset,
    }
  }
}

impl<T> From<Setting<T>> for Option<T> {
  fn from(value: Setting<T>) -> Self {
    match value {
      Setting::Value(v) => Some(v),
      Setting::Unset => None,
    }
  }
}

impl<T: Serialize> Serialize for Setting<T> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.value().serialize(serializer)
  }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Setting<T> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    Option::<T>::deserialize(deserializer).map(Setting::from)
  }
}
