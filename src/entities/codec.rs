//! Declarative document ⇄ row conversion.
//!
//! An [`EntityDef`] describes one entity: its primary key, a list of [`Field`]s
//! and the columns refreshed on import conflicts. Every conversion in the
//! crate goes through [`EntityDef::to_row`] and [`EntityDef::from_row`]; there
//! is no per-entity conversion code.
//!
//! Row layout is always `[key, fields..., extra]`, where `extra` holds document
//! keys outside the canonical shape as a JSON object.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::map::Entry;
use serde_json::{json, Map, Value};

use crate::errors::{MigrationError, Result};

/// Literal primary key of singleton entities.
pub const SINGLETON_KEY: &str = "singleton";
/// Key column name used by singleton tables.
pub const SINGLETON_COLUMN: &str = "id";
/// Column holding unknown document keys.
pub const EXTRA_COLUMN: &str = "extra";

static NULL: SqlValue = SqlValue::Null;

/// The three column types relational backends are restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

/// A single cell of a flat row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    /// Stored as integer 0/1.
    Bool,
    /// Any composite value, stored as JSON text.
    Json,
    /// JSON list of events whose `timestamp` members are normalised to ISO strings.
    EventLog,
    /// ISO-8601 text.
    Timestamp,
}

impl FieldKind {
    pub fn column_type(self) -> ColumnType {
        match self {
            FieldKind::Integer | FieldKind::Bool => ColumnType::Integer,
            FieldKind::Real => ColumnType::Real,
            FieldKind::Text | FieldKind::Json | FieldKind::EventLog | FieldKind::Timestamp => {
                ColumnType::Text
            }
        }
    }
}

/// Default applied when a field is missing on write or NULL on read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fallback {
    /// Optional field: NULL column, key omitted from the document.
    Absent,
    Int(i64),
    Real(f64),
    Text(&'static str),
    Bool(bool),
    EmptyList,
    EmptyObject,
    /// Default for range layouts.
    Pair(i64, i64),
}

impl Fallback {
    fn to_json(self) -> Option<Value> {
        match self {
            Fallback::Absent => None,
            Fallback::Int(i) => Some(Value::from(i)),
            Fallback::Real(f) => Some(real_json(f)),
            Fallback::Text(s) => Some(Value::String(s.to_string())),
            Fallback::Bool(b) => Some(Value::Bool(b)),
            Fallback::EmptyList => Some(Value::Array(Vec::new())),
            Fallback::EmptyObject => Some(Value::Object(Map::new())),
            Fallback::Pair(lo, hi) => Some(json!([lo, hi])),
        }
    }

    fn to_sql(self) -> SqlValue {
        match self {
            Fallback::Absent | Fallback::Pair(..) => SqlValue::Null,
            Fallback::Int(i) => SqlValue::Integer(i),
            Fallback::Real(f) => SqlValue::Real(f),
            Fallback::Text(s) => SqlValue::Text(s.to_string()),
            Fallback::Bool(b) => SqlValue::Integer(i64::from(b)),
            Fallback::EmptyList => SqlValue::Text("[]".to_string()),
            Fallback::EmptyObject => SqlValue::Text("{}".to_string()),
        }
    }
}

/// How a document key maps onto columns.
#[derive(Debug, Clone, Copy)]
pub enum Layout {
    Column { column: &'static str, kind: FieldKind },
    /// Object of integer members, one column per `(member, column)` pair.
    Split { parts: &'static [(&'static str, &'static str)] },
    /// `[min, max]` stored as two integer columns.
    Range { min: &'static str, max: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub key: &'static str,
    pub layout: Layout,
    pub fallback: Fallback,
}

impl Field {
    pub const fn column(
        key: &'static str,
        column: &'static str,
        kind: FieldKind,
        fallback: Fallback,
    ) -> Self {
        Field {
            key,
            layout: Layout::Column { column, kind },
            fallback,
        }
    }

    pub const fn split(key: &'static str, parts: &'static [(&'static str, &'static str)]) -> Self {
        Field {
            key,
            layout: Layout::Split { parts },
            fallback: Fallback::Int(0),
        }
    }

    pub const fn range(key: &'static str, min: &'static str, max: &'static str, lo: i64, hi: i64) -> Self {
        Field {
            key,
            layout: Layout::Range { min, max },
            fallback: Fallback::Pair(lo, hi),
        }
    }

    fn push_columns(&self, out: &mut Vec<Column>) {
        match self.layout {
            Layout::Column { column, kind } => out.push(Column {
                name: column,
                ty: kind.column_type(),
            }),
            Layout::Split { parts } => out.extend(parts.iter().map(|&(_, column)| Column {
                name: column,
                ty: ColumnType::Integer,
            })),
            Layout::Range { min, max } => {
                out.push(Column { name: min, ty: ColumnType::Integer });
                out.push(Column { name: max, ty: ColumnType::Integer });
            }
        }
    }

    fn width(&self) -> usize {
        match self.layout {
            Layout::Column { .. } => 1,
            Layout::Split { parts } => parts.len(),
            Layout::Range { .. } => 2,
        }
    }

    fn encode(&self, entity: &'static str, value: Option<&Value>, out: &mut Vec<SqlValue>) -> Result<()> {
        match self.layout {
            Layout::Column { kind, .. } => {
                let cell = match value {
                    Some(v) => coerce(kind, v)
                        .map_err(|msg| MigrationError::serialization(entity, self.key, msg))?,
                    None => self.fallback.to_sql(),
                };
                out.push(cell);
            }
            Layout::Split { parts } => {
                let members = match value {
                    None => None,
                    Some(Value::Object(m)) => Some(m),
                    Some(other) => {
                        return Err(MigrationError::serialization(
                            entity,
                            self.key,
                            format!("expected an object, found {}", json_type(other)),
                        ))
                    }
                };
                for (member, _) in parts {
                    let cell = match members.and_then(|m| present(m.get(*member))) {
                        Some(v) => coerce(FieldKind::Integer, v).map_err(|msg| {
                            MigrationError::serialization(entity, format!("{}.{}", self.key, member), msg)
                        })?,
                        None => self.fallback.to_sql(),
                    };
                    out.push(cell);
                }
            }
            Layout::Range { .. } => match value {
                Some(v) => {
                    let (lo, hi) = range_bounds(v)
                        .map_err(|msg| MigrationError::serialization(entity, self.key, msg))?;
                    out.push(SqlValue::Integer(lo));
                    out.push(SqlValue::Integer(hi));
                }
                None => {
                    let (lo, hi) = match self.fallback {
                        Fallback::Pair(lo, hi) => (SqlValue::Integer(lo), SqlValue::Integer(hi)),
                        _ => (SqlValue::Null, SqlValue::Null),
                    };
                    out.push(lo);
                    out.push(hi);
                }
            },
        }
        Ok(())
    }

    fn decode<'a>(
        &self,
        entity: &'static str,
        cells: &mut impl Iterator<Item = &'a SqlValue>,
        doc: &mut Map<String, Value>,
    ) -> Result<()> {
        match self.layout {
            Layout::Column { kind, .. } => {
                let raw = cells.next().unwrap_or(&NULL);
                let value = if raw.is_null() {
                    self.fallback.to_json()
                } else {
                    Some(
                        decode_cell(kind, raw)
                            .map_err(|msg| MigrationError::serialization(entity, self.key, msg))?,
                    )
                };
                if let Some(v) = value {
                    doc.insert(self.key.to_string(), v);
                }
            }
            Layout::Split { parts } => {
                let mut members = Map::new();
                for (member, _) in parts {
                    let raw = cells.next().unwrap_or(&NULL);
                    let value = if raw.is_null() {
                        self.fallback.to_json()
                    } else {
                        Some(decode_cell(FieldKind::Integer, raw).map_err(|msg| {
                            MigrationError::serialization(entity, format!("{}.{}", self.key, member), msg)
                        })?)
                    };
                    if let Some(v) = value {
                        members.insert(member.to_string(), v);
                    }
                }
                doc.insert(self.key.to_string(), Value::Object(members));
            }
            Layout::Range { .. } => {
                let (lo_default, hi_default) = match self.fallback {
                    Fallback::Pair(lo, hi) => (Some(lo), Some(hi)),
                    _ => (None, None),
                };
                let lo = range_cell(cells.next().unwrap_or(&NULL), lo_default)
                    .map_err(|msg| MigrationError::serialization(entity, self.key, msg))?;
                let hi = range_cell(cells.next().unwrap_or(&NULL), hi_default)
                    .map_err(|msg| MigrationError::serialization(entity, self.key, msg))?;
                if let (Some(lo), Some(hi)) = (lo, hi) {
                    doc.insert(self.key.to_string(), json!([lo, hi]));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PrimaryKey {
    Field { key: &'static str, column: &'static str },
    /// One row keyed by [`SINGLETON_KEY`].
    Singleton,
}

/// Columns refreshed when an imported row collides with an existing key.
#[derive(Debug, Clone, Copy)]
pub enum Upsert {
    All,
    Columns(&'static [&'static str]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

/// A flat row, aligned with [`EntityDef::columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<SqlValue>,
}

impl Row {
    /// Primary key cell rendered as text.
    pub fn key(&self) -> Option<String> {
        match self.values.first() {
            Some(SqlValue::Text(s)) => Some(s.clone()),
            Some(SqlValue::Integer(i)) => Some(i.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct EntityDef {
    pub name: &'static str,
    /// Collection file stem and table name.
    pub collection: &'static str,
    pub primary_key: PrimaryKey,
    pub fields: &'static [Field],
    pub upsert: Upsert,
}

impl EntityDef {
    pub fn is_singleton(&self) -> bool {
        matches!(self.primary_key, PrimaryKey::Singleton)
    }

    pub fn table(&self) -> &'static str {
        self.collection
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.collection)
    }

    pub fn key_column(&self) -> &'static str {
        match self.primary_key {
            PrimaryKey::Field { column, .. } => column,
            PrimaryKey::Singleton => SINGLETON_COLUMN,
        }
    }

    pub fn columns(&self) -> Vec<Column> {
        let mut out = Vec::with_capacity(self.column_count());
        out.push(Column {
            name: self.key_column(),
            ty: ColumnType::Text,
        });
        for field in self.fields {
            field.push_columns(&mut out);
        }
        out.push(Column {
            name: EXTRA_COLUMN,
            ty: ColumnType::Text,
        });
        out
    }

    pub fn column_count(&self) -> usize {
        2 + self.fields.iter().map(Field::width).sum::<usize>()
    }

    /// Non-key columns overwritten on a primary-key conflict.
    pub fn update_columns(&self) -> Vec<&'static str> {
        match self.upsert {
            Upsert::All => self.columns().into_iter().skip(1).map(|c| c.name).collect(),
            Upsert::Columns(list) => {
                let mut cols = list.to_vec();
                cols.push(EXTRA_COLUMN);
                cols
            }
        }
    }

    fn is_known_key(&self, key: &str) -> bool {
        if let PrimaryKey::Field { key: pk, .. } = self.primary_key {
            if pk == key {
                return true;
            }
        }
        self.fields.iter().any(|f| f.key == key)
    }

    /// Identifier used in log lines and skip reports.
    pub fn record_id(&self, doc: &Value) -> String {
        match self.primary_key {
            PrimaryKey::Singleton => SINGLETON_KEY.to_string(),
            PrimaryKey::Field { key, .. } => match doc {
                Value::String(s) => s.clone(),
                Value::Object(m) => match m.get(key) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => "<no key>".to_string(),
                },
                _ => "<not an object>".to_string(),
            },
        }
    }

    pub fn to_row(&self, doc: &Value) -> Result<Row> {
        let shorthand;
        let obj = match (doc, self.primary_key) {
            (Value::Object(map), _) => map,
            (Value::String(s), PrimaryKey::Field { key, .. }) => {
                let mut map = Map::new();
                map.insert(key.to_string(), Value::String(s.clone()));
                shorthand = map;
                &shorthand
            }
            (other, _) => {
                return Err(MigrationError::serialization(
                    self.name,
                    "<document>",
                    format!("expected an object, found {}", json_type(other)),
                ))
            }
        };

        let mut values = Vec::with_capacity(self.column_count());
        match self.primary_key {
            PrimaryKey::Field { key, .. } => {
                let id = match present(obj.get(key)) {
                    Some(Value::String(s)) if !s.is_empty() => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => {
                        return Err(MigrationError::serialization(
                            self.name,
                            key,
                            "missing primary key",
                        ))
                    }
                };
                values.push(SqlValue::Text(id));
            }
            PrimaryKey::Singleton => values.push(SqlValue::Text(SINGLETON_KEY.to_string())),
        }

        for field in self.fields {
            field.encode(self.name, present(obj.get(field.key)), &mut values)?;
        }

        let mut extra: Map<String, Value> = obj
            .iter()
            .filter(|(k, _)| !self.is_known_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        // Split members without a column ride along under the field key.
        for field in self.fields {
            if let (Layout::Split { parts }, Some(Value::Object(members))) =
                (field.layout, present(obj.get(field.key)))
            {
                let leftover: Map<String, Value> = members
                    .iter()
                    .filter(|(m, _)| !parts.iter().any(|(p, _)| p == m))
                    .map(|(m, v)| (m.clone(), v.clone()))
                    .collect();
                if !leftover.is_empty() {
                    extra.insert(field.key.to_string(), Value::Object(leftover));
                }
            }
        }
        values.push(if extra.is_empty() {
            SqlValue::Null
        } else {
            SqlValue::Text(serde_json::to_string(&Value::Object(extra))?)
        });

        Ok(Row { values })
    }

    pub fn from_row(&self, row: &Row) -> Result<Value> {
        let expected = self.column_count();
        if row.values.len() != expected {
            return Err(MigrationError::serialization(
                self.name,
                "<row>",
                format!("expected {expected} columns, found {}", row.values.len()),
            ));
        }

        let mut cells = row.values.iter();
        let mut doc = Map::new();

        let key_cell = cells.next().unwrap_or(&NULL);
        if let PrimaryKey::Field { key, .. } = self.primary_key {
            let id = match key_cell {
                SqlValue::Text(s) => s.clone(),
                SqlValue::Integer(i) => i.to_string(),
                _ => {
                    return Err(MigrationError::serialization(
                        self.name,
                        key,
                        "missing primary key",
                    ))
                }
            };
            doc.insert(key.to_string(), Value::String(id));
        }

        for field in self.fields {
            field.decode(self.name, &mut cells, &mut doc)?;
        }

        if let Some(SqlValue::Text(text)) = cells.next() {
            let extra: Value = serde_json::from_str(text).map_err(|e| {
                MigrationError::serialization(self.name, EXTRA_COLUMN, format!("malformed JSON: {e}"))
            })?;
            match extra {
                Value::Object(map) => {
                    for (k, v) in map {
                        match doc.entry(k) {
                            Entry::Vacant(slot) => {
                                slot.insert(v);
                            }
                            Entry::Occupied(mut slot) => {
                                if let (Value::Object(members), Value::Object(more)) = (slot.get_mut(), v) {
                                    for (m, mv) in more {
                                        members.entry(m).or_insert(mv);
                                    }
                                }
                            }
                        }
                    }
                }
                Value::Null => {}
                other => {
                    return Err(MigrationError::serialization(
                        self.name,
                        EXTRA_COLUMN,
                        format!("expected an object, found {}", json_type(&other)),
                    ))
                }
            }
        }

        Ok(Value::Object(doc))
    }

    /// The defaults table: every field that has a default, in document shape.
    pub fn defaults(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for field in self.fields {
            let value = match field.layout {
                Layout::Split { parts } => field.fallback.to_json().map(|v| {
                    Value::Object(parts.iter().map(|(m, _)| (m.to_string(), v.clone())).collect())
                }),
                _ => field.fallback.to_json(),
            };
            if let Some(v) = value {
                out.insert(field.key.to_string(), v);
            }
        }
        out
    }

    /// `doc` with every omitted field filled from the defaults table, explicit
    /// nulls on optional fields removed and integral reals written as integers.
    pub fn with_defaults(&self, doc: &Value) -> Value {
        let mut map = match (doc, self.primary_key) {
            (Value::Object(m), _) => m.clone(),
            (Value::String(s), PrimaryKey::Field { key, .. }) => {
                let mut m = Map::new();
                m.insert(key.to_string(), Value::String(s.clone()));
                m
            }
            _ => return doc.clone(),
        };

        for field in self.fields {
            let fallback = field.fallback.to_json();
            match field.layout {
                Layout::Split { parts } => {
                    let entry = map
                        .entry(field.key.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if entry.is_null() {
                        *entry = Value::Object(Map::new());
                    }
                    if let (Value::Object(members), Some(default)) = (entry, fallback) {
                        for (member, _) in parts {
                            if members.get(*member).map_or(true, Value::is_null) {
                                members.insert(member.to_string(), default.clone());
                            }
                        }
                    }
                }
                Layout::Column { kind: FieldKind::Real, .. } => match map.get(field.key) {
                    Some(Value::Number(n)) if n.is_f64() => {
                        let v = n.as_f64().map_or(Value::Null, real_json);
                        map.insert(field.key.to_string(), v);
                    }
                    Some(v) if !v.is_null() => {}
                    _ => match fallback {
                        Some(v) => {
                            map.insert(field.key.to_string(), v);
                        }
                        None => {
                            map.remove(field.key);
                        }
                    },
                },
                _ => {
                    if map.get(field.key).map_or(true, Value::is_null) {
                        match fallback {
                            Some(v) => {
                                map.insert(field.key.to_string(), v);
                            }
                            None => {
                                map.remove(field.key);
                            }
                        }
                    }
                }
            }
        }
        Value::Object(map)
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn coerce(kind: FieldKind, value: &Value) -> std::result::Result<SqlValue, String> {
    match kind {
        FieldKind::Text => match value {
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            Value::Number(n) => Ok(SqlValue::Text(n.to_string())),
            Value::Bool(b) => Ok(SqlValue::Text(b.to_string())),
            other => Err(format!("expected text, found {}", json_type(other))),
        },
        FieldKind::Integer => integer(value).map(SqlValue::Integer),
        FieldKind::Real => real(value).map(SqlValue::Real),
        FieldKind::Bool => boolean(value).map(|b| SqlValue::Integer(i64::from(b))),
        FieldKind::Json => serde_json::to_string(value)
            .map(SqlValue::Text)
            .map_err(|e| e.to_string()),
        FieldKind::EventLog => {
            let events = normalize_event_log(value)?;
            serde_json::to_string(&events)
                .map(SqlValue::Text)
                .map_err(|e| e.to_string())
        }
        FieldKind::Timestamp => normalize_timestamp(value).map(SqlValue::Text),
    }
}

fn integer(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            n.as_f64()
                .and_then(integral)
                .ok_or_else(|| format!("{n} is not an integer"))
        }
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
                .ok_or_else(|| format!("'{s}' is not an integer"))
        }
        other => Err(format!("expected an integer, found {}", json_type(other))),
    }
}

/// `f` as an integer when it has no fractional part and fits.
fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

/// JSON has one number type; integral reals come back as integers.
fn real_json(f: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT {
        Value::from(f as i64)
    } else {
        Value::from(f)
    }
}

fn real(value: &Value) -> std::result::Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a number")),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number")),
        other => Err(format!("expected a number, found {}", json_type(other))),
    }
}

fn boolean(value: &Value) -> std::result::Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map_or(false, |f| f != 0.0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            _ => Err(format!("'{s}' is not a boolean")),
        },
        other => Err(format!("expected a boolean, found {}", json_type(other))),
    }
}

fn range_bounds(value: &Value) -> std::result::Result<(i64, i64), String> {
    match value {
        Value::Array(items) if items.len() == 2 => Ok((integer(&items[0])?, integer(&items[1])?)),
        Value::Object(m) => match (present(m.get("min")), present(m.get("max"))) {
            (Some(lo), Some(hi)) => Ok((integer(lo)?, integer(hi)?)),
            _ => Err("range object needs min and max".to_string()),
        },
        Value::Number(_) => {
            let n = integer(value)?;
            Ok((n, n))
        }
        other => Err(format!("expected [min, max], found {}", json_type(other))),
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// RFC 3339 strings pass through untouched; naive date-times and epoch numbers
/// become UTC ISO strings with millisecond precision.
pub fn normalize_timestamp(value: &Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => {
            if DateTime::parse_from_rfc3339(s).is_ok() {
                return Ok(s.clone());
            }
            for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Ok(iso(naive.and_utc()));
                }
            }
            Err(format!("'{s}' is not a recognised timestamp"))
        }
        Value::Number(n) => {
            let raw = n.as_f64().ok_or_else(|| format!("{n} is not a timestamp"))?;
            // Values this large are JavaScript-style epoch milliseconds.
            let millis = if raw.abs() >= 1e11 { raw } else { raw * 1000.0 };
            Utc.timestamp_millis_opt(millis.round() as i64)
                .single()
                .map(iso)
                .ok_or_else(|| format!("{n} is out of timestamp range"))
        }
        other => Err(format!("expected a timestamp, found {}", json_type(other))),
    }
}

fn normalize_event_log(value: &Value) -> std::result::Result<Value, String> {
    let Value::Array(events) = value else {
        return Err(format!("expected a list of events, found {}", json_type(value)));
    };
    let mut out = Vec::with_capacity(events.len());
    for (idx, event) in events.iter().enumerate() {
        match event {
            Value::Object(m) => {
                let mut m = m.clone();
                let normalized = match present(m.get("timestamp")) {
                    Some(ts) => Some(normalize_timestamp(ts).map_err(|e| format!("event {idx}: {e}"))?),
                    None => None,
                };
                if let Some(ts) = normalized {
                    m.insert("timestamp".to_string(), Value::String(ts));
                }
                out.push(Value::Object(m));
            }
            other => out.push(other.clone()),
        }
    }
    Ok(Value::Array(out))
}

fn cell_integer(raw: &SqlValue) -> std::result::Result<i64, String> {
    match raw {
        SqlValue::Integer(i) => Ok(*i),
        SqlValue::Real(f) => integral(*f).ok_or_else(|| format!("{f} is not an integer")),
        SqlValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{s}' is not an integer")),
        other => Err(format!("expected an integer cell, found {other:?}")),
    }
}

fn range_cell(raw: &SqlValue, fallback: Option<i64>) -> std::result::Result<Option<i64>, String> {
    if raw.is_null() {
        Ok(fallback)
    } else {
        cell_integer(raw).map(Some)
    }
}

fn decode_cell(kind: FieldKind, raw: &SqlValue) -> std::result::Result<Value, String> {
    match kind {
        FieldKind::Text | FieldKind::Timestamp => match raw {
            SqlValue::Text(s) => Ok(Value::String(s.clone())),
            SqlValue::Integer(i) => Ok(Value::String(i.to_string())),
            SqlValue::Real(f) => Ok(Value::String(f.to_string())),
            SqlValue::Null => Ok(Value::Null),
        },
        FieldKind::Integer => cell_integer(raw).map(Value::from),
        FieldKind::Real => match raw {
            SqlValue::Real(f) => Ok(real_json(*f)),
            SqlValue::Integer(i) => Ok(Value::from(*i)),
            SqlValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(real_json)
                .map_err(|_| format!("'{s}' is not a number")),
            SqlValue::Null => Ok(Value::Null),
        },
        FieldKind::Bool => match raw {
            SqlValue::Text(s) => boolean(&Value::String(s.clone())).map(Value::Bool),
            other => cell_integer(other).map(|i| Value::Bool(i != 0)),
        },
        FieldKind::Json | FieldKind::EventLog => match raw {
            SqlValue::Text(s) => serde_json::from_str(s).map_err(|e| format!("malformed JSON: {e}")),
            other => Err(format!("expected JSON text, found {other:?}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[Field] = &[
        Field::column("label", "label", FieldKind::Text, Fallback::Text("none")),
        Field::column("hp", "hp", FieldKind::Integer, Fallback::Int(100)),
        Field::column("weight", "weight", FieldKind::Real, Fallback::Real(0.0)),
        Field::column("alive", "alive", FieldKind::Bool, Fallback::Bool(true)),
        Field::column("vendor", "vendor", FieldKind::Bool, Fallback::Absent),
        Field::column("bag", "bag", FieldKind::Json, Fallback::EmptyList),
        Field::column("seen", "seen", FieldKind::Timestamp, Fallback::Absent),
        Field::split("purse", &[("gold", "gold"), ("copper", "copper")]),
        Field::range("hit", "hit_min", "hit_max", 1, 3),
    ];

    const THING: EntityDef = EntityDef {
        name: "Thing",
        collection: "things",
        primary_key: PrimaryKey::Field { key: "thingId", column: "thing_id" },
        fields: FIELDS,
        upsert: Upsert::Columns(&["hp"]),
    };

    #[test]
    fn columns_follow_layout_order() {
        let names: Vec<_> = THING.columns().iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec![
                "thing_id", "label", "hp", "weight", "alive", "vendor", "bag", "seen", "gold",
                "copper", "hit_min", "hit_max", "extra"
            ]
        );
        assert_eq!(THING.column_count(), names.len());
        assert_eq!(THING.update_columns(), vec!["hp", "extra"]);
    }

    #[test]
    fn sparse_document_gets_defaults() {
        let row = THING.to_row(&json!({"thingId": "t1"})).unwrap();
        assert_eq!(row.values[2], SqlValue::Integer(100));
        assert_eq!(row.values[4], SqlValue::Integer(1));
        assert_eq!(row.values[5], SqlValue::Null);
        assert_eq!(row.values[6], SqlValue::Text("[]".into()));
        assert_eq!(row.values[10], SqlValue::Integer(1));
        assert_eq!(row.values[11], SqlValue::Integer(3));

        let doc = THING.from_row(&row).unwrap();
        assert_eq!(doc, THING.with_defaults(&json!({"thingId": "t1"})));
        assert!(doc.get("vendor").is_none());
        assert!(doc.get("seen").is_none());
    }

    #[test]
    fn coercions_accept_loose_input() {
        let row = THING
            .to_row(&json!({
                "thingId": 7,
                "hp": "42",
                "alive": "no",
                "vendor": 1,
                "weight": 2,
                "purse": {"gold": 3.0},
                "hit": {"min": 2, "max": 5},
                "seen": 1_700_000_000_000i64
            }))
            .unwrap();
        assert_eq!(row.key().as_deref(), Some("7"));
        assert_eq!(row.values[2], SqlValue::Integer(42));
        assert_eq!(row.values[3], SqlValue::Real(2.0));
        assert_eq!(row.values[4], SqlValue::Integer(0));
        assert_eq!(row.values[5], SqlValue::Integer(1));
        assert_eq!(row.values[7], SqlValue::Text("2023-11-14T22:13:20.000Z".into()));
        assert_eq!(row.values[8], SqlValue::Integer(3));
        assert_eq!(row.values[9], SqlValue::Integer(0));
        assert_eq!(row.values[10], SqlValue::Integer(2));
        assert_eq!(row.values[11], SqlValue::Integer(5));
    }

    #[test]
    fn fractional_values_are_not_integers() {
        for hp in [json!(2.5), json!("7.9"), json!(1e300)] {
            let err = THING.to_row(&json!({"thingId": "t5", "hp": hp})).unwrap_err();
            assert!(err.is_recoverable(), "{hp}");
        }
        let row = THING.to_row(&json!({"thingId": "t5", "hp": 4.0, "purse": {"gold": "2"}})).unwrap();
        assert_eq!(row.values[2], SqlValue::Integer(4));
        assert!(THING
            .to_row(&json!({"thingId": "t5", "purse": {"gold": 0.5}}))
            .is_err());

        let mut row = THING.to_row(&json!({"thingId": "t5"})).unwrap();
        row.values[2] = SqlValue::Real(3.25);
        assert!(THING.from_row(&row).is_err());
    }

    #[test]
    fn integral_reals_come_back_as_integers() {
        for doc in [
            json!({"thingId": "t6", "weight": 1}),
            json!({"thingId": "t6", "weight": 1.0}),
            json!({"thingId": "t6", "weight": 0.75}),
        ] {
            let back = THING.from_row(&THING.to_row(&doc).unwrap()).unwrap();
            assert_eq!(back, THING.with_defaults(&doc), "{doc}");
        }
        let back = THING.from_row(&THING.to_row(&json!({"thingId": "t6", "weight": 1})).unwrap()).unwrap();
        assert_eq!(back["weight"], json!(1));
    }

    #[test]
    fn split_members_without_columns_are_kept() {
        let doc = json!({"thingId": "t7", "purse": {"gold": 1, "copper": 3, "platinum": 9}});
        let row = THING.to_row(&doc).unwrap();
        assert_eq!(row.values[8], SqlValue::Integer(1));
        let back = THING.from_row(&row).unwrap();
        assert_eq!(back["purse"], json!({"gold": 1, "copper": 3, "platinum": 9}));
        assert_eq!(back, THING.with_defaults(&doc));
    }

    #[test]
    fn unknown_keys_survive_in_extra() {
        let doc = json!({"thingId": "t2", "hp": 5, "legacyScore": [1, 2], "note": null});
        let row = THING.to_row(&doc).unwrap();
        let back = THING.from_row(&row).unwrap();
        assert_eq!(back["legacyScore"], json!([1, 2]));
        assert!(back.as_object().unwrap().contains_key("note"));
    }

    #[test]
    fn malformed_json_cell_names_entity_and_field() {
        let mut row = THING.to_row(&json!({"thingId": "t3"})).unwrap();
        row.values[6] = SqlValue::Text("[not json".into());
        match THING.from_row(&row) {
            Err(MigrationError::Serialization { entity, field, .. }) => {
                assert_eq!(entity, "Thing");
                assert_eq!(field, "bag");
            }
            other => panic!("expected serialization error, got {other:?}"),
        }
    }

    #[test]
    fn missing_key_and_non_objects_are_rejected() {
        assert!(THING.to_row(&json!({"hp": 1})).is_err());
        assert!(THING.to_row(&json!(42)).is_err());
        let shorthand = THING.to_row(&json!("t4")).unwrap();
        assert_eq!(shorthand.key().as_deref(), Some("t4"));
    }

    #[test]
    fn timestamps_normalise_to_iso() {
        assert_eq!(
            normalize_timestamp(&json!("2024-03-01T10:00:00Z")).unwrap(),
            "2024-03-01T10:00:00Z"
        );
        assert_eq!(
            normalize_timestamp(&json!("2024-03-01 10:00:00")).unwrap(),
            "2024-03-01T10:00:00.000Z"
        );
        assert_eq!(
            normalize_timestamp(&json!(1_700_000_000)).unwrap(),
            "2023-11-14T22:13:20.000Z"
        );
        assert!(normalize_timestamp(&json!("yesterday")).is_err());
    }

    #[test]
    fn event_log_timestamps_are_normalised() {
        let events = normalize_event_log(&json!([
            {"event": "created", "timestamp": 1_700_000_000_000i64},
            {"event": "moved"},
            "legacy"
        ]))
        .unwrap();
        assert_eq!(events[0]["timestamp"], json!("2023-11-14T22:13:20.000Z"));
        assert!(events[1].get("timestamp").is_none());
        assert_eq!(events[2], json!("legacy"));
    }
}
