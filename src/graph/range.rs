//! Range addressing and the two-column key/value cell layout.

// std
use std::num::NonZeroUsize;
// crates.io
use serde::{
	Deserializer,
	de::{MapAccess, Visitor},
};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
// self
use crate::_prelude::*;

/// Rows of rendered cell text.
pub type CellMatrix = Vec<Vec<String>>;

/// Closed `A1:B{N}` range covering exactly `N` key/value rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RangeAddress {
	rows: NonZeroUsize,
}
impl RangeAddress {
	/// Address for `rows` rows, or `None` when there is nothing to write.
	pub fn for_rows(rows: usize) -> Option<Self> {
		NonZeroUsize::new(rows).map(|rows| Self { rows })
	}

	/// Number of rows covered.
	pub fn rows(self) -> usize {
		self.rows.get()
	}
}
impl Display for RangeAddress {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "A1:B{}", self.rows)
	}
}

/// One submitted field value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
	/// Plain text.
	Text(String),
	/// Multiple selections, rendered joined by `", "`.
	List(Vec<String>),
	/// Instant rendered as RFC 3339.
	Timestamp(OffsetDateTime),
	/// Any other JSON value: `null` renders empty, everything else as compact JSON.
	Other(Value),
}
impl FieldValue {
	/// Renders the value as cell text.
	pub fn render(&self) -> String {
		match self {
			Self::Text(text) => text.clone(),
			Self::List(items) => items.join(", "),
			Self::Timestamp(instant) =>
				instant.format(&Rfc3339).unwrap_or_else(|_| instant.to_string()),
			Self::Other(value) => render_json(value),
		}
	}
}
impl From<&str> for FieldValue {
	fn from(value: &str) -> Self {
		Self::Text(value.to_owned())
	}
}
impl From<String> for FieldValue {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}
impl From<Vec<String>> for FieldValue {
	fn from(value: Vec<String>) -> Self {
		Self::List(value)
	}
}
impl From<OffsetDateTime> for FieldValue {
	fn from(value: OffsetDateTime) -> Self {
		Self::Timestamp(value)
	}
}
impl From<Value> for FieldValue {
	fn from(value: Value) -> Self {
		match value {
			Value::String(text) => Self::Text(text),
			Value::Array(items) if items.iter().all(Value::is_string) => Self::List(
				items
					.into_iter()
					.filter_map(|item| match item {
						Value::String(text) => Some(text),
						_ => None,
					})
					.collect(),
			),
			other => Self::Other(other),
		}
	}
}
impl<'de> Deserialize<'de> for FieldValue {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Value::deserialize(deserializer).map(Self::from)
	}
}

/// Submitted fields in the order the caller supplied them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncData {
	fields: Vec<(String, FieldValue)>,
}
impl SyncData {
	/// Creates an empty data set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a field, keeping earlier fields in place.
	pub fn push(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
		self.fields.push((key.into(), value.into()));
	}

	/// Builder-style [`push`](Self::push).
	pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
		self.push(key, value);

		self
	}

	/// Number of fields.
	pub fn len(&self) -> usize {
		self.fields.len()
	}

	/// Returns `true` when there are no fields.
	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	/// Iterates over the fields in order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
		self.fields.iter().map(|(key, value)| (key.as_str(), value))
	}

	/// Renders one `[key, value]` row per field.
	pub fn to_matrix(&self) -> CellMatrix {
		self.iter().map(|(key, value)| vec![key.to_owned(), value.render()]).collect()
	}
}
impl<K, V> FromIterator<(K, V)> for SyncData
where
	K: Into<String>,
	V: Into<FieldValue>,
{
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
	{
		Self { fields: iter.into_iter().map(|(key, value)| (key.into(), value.into())).collect() }
	}
}
impl<'de> Deserialize<'de> for SyncData {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		struct FieldsVisitor;
		impl<'de> Visitor<'de> for FieldsVisitor {
			type Value = SyncData;

			fn expecting(&self, f: &mut Formatter) -> FmtResult {
				f.write_str("an object of field values")
			}

			fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
			where
				A: MapAccess<'de>,
			{
				let mut data = SyncData::new();

				while let Some((key, value)) = map.next_entry::<String, FieldValue>()? {
					data.push(key, value);
				}

				Ok(data)
			}
		}

		deserializer.deserialize_map(FieldsVisitor)
	}
}

/// A bounded write of rendered rows into one worksheet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
	/// Target worksheet name.
	pub sheet_name: String,
	/// Range the rows occupy.
	pub address: RangeAddress,
	/// Rendered `[key, value]` rows; never empty.
	pub rows: CellMatrix,
}
impl WriteRequest {
	/// Builds the request for `data`, or `None` when `data` is empty.
	pub fn new(sheet_name: impl Into<String>, data: &SyncData) -> Option<Self> {
		let address = RangeAddress::for_rows(data.len())?;

		Some(Self { sheet_name: sheet_name.into(), address, rows: data.to_matrix() })
	}
}

#[derive(Serialize)]
pub(crate) struct WireRangeUpdate<'a> {
	pub(crate) values: &'a CellMatrix,
}

#[derive(Deserialize)]
pub(crate) struct WireRange {
	#[serde(default)]
	pub(crate) values: Vec<Vec<Value>>,
}
impl WireRange {
	pub(crate) fn into_matrix(self) -> CellMatrix {
		self.values.iter().map(|row| row.iter().map(render_json).collect()).collect()
	}
}

fn render_json(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::String(text) => text.clone(),
		other => other.to_string(),
	}
}
