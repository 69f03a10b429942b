//! Avro transcoding and the Confluent wire format
//!
//! [`AvroEncoder`] maps a JSON payload onto a registry schema, field by
//! field, and produces a [`BinaryRecord`]. [`AvroDecoder`] does the reverse
//! for the consume path. Both are stateless; the schema is always supplied.
//!
//! # Coercion
//!
//! JSON producers are loose about types, so the encoder coerces where the
//! intent is unambiguous:
//!
//! | Schema type            | Accepted JSON                                   |
//! |------------------------|-------------------------------------------------|
//! | `int`, `long`          | integral numbers, numeric strings (`"5"`)       |
//! | `float`, `double`      | any number, numeric strings                     |
//! | `boolean`              | `true`/`false`, `"true"`/`"false"`              |
//! | `string`               | strings, numbers, booleans                      |
//! | `enum`                 | symbol, matched case-insensitively if no exact hit |
//! | `bytes`, `fixed`       | base64 strings                                  |
//! | `decimal`              | numbers or decimal strings (`"12.30"`)          |
//! | `duration`             | `{"months": .., "days": .., "millis": ..}`      |
//! | `uuid`                 | canonical UUID strings                          |
//! | date/time/timestamp    | integral numbers (epoch based)                  |
//!
//! Schema defaults for `bytes`, `fixed`, `decimal` and `duration` follow the
//! Avro rule instead: ISO-8859-1 strings, one code point per byte.
//!
//! Decoding renders `decimal` as a scaled decimal string and `duration` in
//! the same object form.
//! Unions are tried in declaration order, first without coercion and then
//! with it, so `["int","string"]` keeps `"5"` a string. The Avro JSON
//! wrapped form `{"string": "x"}` is also accepted. Missing record fields
//! take their schema default; a missing field without default is an error.
//!
//! # Wire format
//!
//! ```text
//! +------+----------------+---------------------+
//! | 0x00 | schema id (BE) | Avro binary datum   |
//! +------+----------------+---------------------+
//!   1 B        4 B              remainder
//! ```

use crate::error::{BridgeError, BridgeResult};
use crate::registry::SchemaId;
use apache_avro::{from_avro_datum, to_avro_datum, types::Value, Days, Millis, Months, Schema};
use base64::Engine;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::io::Cursor;

/// Confluent serialization format version
pub const MAGIC_BYTE: u8 = 0x00;

/// Magic byte plus schema id
pub const WIRE_HEADER_LEN: usize = 5;

/// A parsed Avro schema plus its named-type table
#[derive(Clone)]
pub struct AvroSchema {
    inner: Schema,
    raw: String,
    names: HashMap<String, Schema>,
}

impl std::fmt::Debug for AvroSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvroSchema")
            .field("name", &self.fullname())
            .field("raw", &self.raw)
            .finish()
    }
}

impl AvroSchema {
    /// Parse a schema definition as returned by the registry
    pub fn parse(raw: &str) -> Result<Self, apache_avro::Error> {
        let inner = Schema::parse_str(raw)?;
        let mut names = HashMap::new();
        collect_names(&inner, &mut names);
        Ok(Self {
            inner,
            raw: raw.to_string(),
            names,
        })
    }

    pub fn inner(&self) -> &Schema {
        &self.inner
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Simple name of a named top-level type
    pub fn name(&self) -> Option<&str> {
        match &self.inner {
            Schema::Record(r) => Some(r.name.name.as_str()),
            Schema::Enum(e) => Some(e.name.name.as_str()),
            Schema::Fixed(f) => Some(f.name.name.as_str()),
            _ => None,
        }
    }

    /// Namespace-qualified name of a named top-level type
    pub fn fullname(&self) -> Option<String> {
        match &self.inner {
            Schema::Record(r) => Some(r.name.fullname(None)),
            Schema::Enum(e) => Some(e.name.fullname(None)),
            Schema::Fixed(f) => Some(f.name.fullname(None)),
            _ => None,
        }
    }

    /// Case-insensitive match against the simple or the full name
    pub fn matches_name(&self, name: &str) -> bool {
        self.name().is_some_and(|n| n.eq_ignore_ascii_case(name))
            || self
                .fullname()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
    }
}

fn collect_names(schema: &Schema, names: &mut HashMap<String, Schema>) {
    match schema {
        Schema::Record(r) => {
            names.insert(r.name.fullname(None), schema.clone());
            for field in &r.fields {
                collect_names(&field.schema, names);
            }
        }
        Schema::Enum(e) => {
            names.insert(e.name.fullname(None), schema.clone());
        }
        Schema::Fixed(f) => {
            names.insert(f.name.fullname(None), schema.clone());
        }
        Schema::Array(a) => collect_names(&a.items, names),
        Schema::Map(m) => collect_names(&m.types, names),
        Schema::Union(u) => {
            for variant in u.variants() {
                collect_names(variant, names);
            }
        }
        _ => {}
    }
}

/// Output of [`AvroEncoder::encode`]
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryRecord {
    /// Structured record, as validated against the schema
    pub value: Value,
    /// Avro binary datum, without wire header
    pub datum: Vec<u8>,
}

impl BinaryRecord {
    /// Frame the datum in the Confluent wire format
    pub fn to_wire(&self, schema_id: SchemaId) -> Vec<u8> {
        wire_encode(schema_id, &self.datum)
    }
}

/// Prefix a datum with the magic byte and schema id
pub fn wire_encode(schema_id: SchemaId, datum: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WIRE_HEADER_LEN + datum.len());
    out.push(MAGIC_BYTE);
    out.extend_from_slice(&schema_id.0.to_be_bytes());
    out.extend_from_slice(datum);
    out
}

/// Split wire-format bytes into schema id and datum
pub fn wire_decode(bytes: &[u8]) -> BridgeResult<(SchemaId, &[u8])> {
    if bytes.len() < WIRE_HEADER_LEN {
        return Err(BridgeError::Decoding(format!(
            "payload too short for wire format: {} bytes",
            bytes.len()
        )));
    }
    if bytes[0] != MAGIC_BYTE {
        return Err(BridgeError::Decoding(format!(
            "invalid magic byte: expected 0, got {}",
            bytes[0]
        )));
    }
    let id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    Ok((SchemaId::new(id), &bytes[WIRE_HEADER_LEN..]))
}

/// JSON text to Avro binary
#[derive(Debug, Clone, Copy, Default)]
pub struct AvroEncoder;

impl AvroEncoder {
    /// Parse `json_payload` and encode it against `schema`
    pub fn encode(json_payload: &[u8], schema: &AvroSchema) -> BridgeResult<BinaryRecord> {
        let json: JsonValue = serde_json::from_slice(json_payload)
            .map_err(|e| BridgeError::Encoding(format!("payload is not valid JSON: {}", e)))?;
        Self::encode_value(&json, schema)
    }

    /// Encode an already parsed JSON value
    pub fn encode_value(json: &JsonValue, schema: &AvroSchema) -> BridgeResult<BinaryRecord> {
        let converter = JsonToAvro {
            names: &schema.names,
            lenient: true,
            defaults: false,
        };
        let value = converter.convert(json, &schema.inner, "$")?;
        let datum = to_avro_datum(&schema.inner, value.clone())
            .map_err(|e| BridgeError::Encoding(e.to_string()))?;
        Ok(BinaryRecord { value, datum })
    }
}

/// Avro binary to JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct AvroDecoder;

impl AvroDecoder {
    /// Decode a bare datum written with `schema`
    pub fn decode(datum: &[u8], schema: &AvroSchema) -> BridgeResult<JsonValue> {
        let mut cursor = Cursor::new(datum);
        let value = from_avro_datum(&schema.inner, &mut cursor, None)
            .map_err(|e| BridgeError::Decoding(e.to_string()))?;
        AvroToJson {
            names: &schema.names,
        }
        .convert(&value, Some(&schema.inner))
    }
}

struct JsonToAvro<'a> {
    names: &'a HashMap<String, Schema>,
    lenient: bool,
    /// Converting a schema default rather than a payload value
    defaults: bool,
}

impl JsonToAvro<'_> {
    fn strict(&self) -> Self {
        JsonToAvro {
            names: self.names,
            lenient: false,
            defaults: self.defaults,
        }
    }

    fn convert(&self, json: &JsonValue, schema: &Schema, path: &str) -> BridgeResult<Value> {
        match schema {
            Schema::Null => match json {
                JsonValue::Null => Ok(Value::Null),
                _ => Err(mismatch(path, "null", json)),
            },
            Schema::Boolean => match json {
                JsonValue::Bool(b) => Ok(Value::Boolean(*b)),
                JsonValue::String(s) if self.lenient => s
                    .trim()
                    .parse::<bool>()
                    .map(Value::Boolean)
                    .map_err(|_| mismatch(path, "boolean", json)),
                _ => Err(mismatch(path, "boolean", json)),
            },
            Schema::Int => self.int(json, path, "int").map(Value::Int),
            Schema::Long => self.long(json, path, "long").map(Value::Long),
            Schema::Float => self.double(json, path, "float").map(|f| Value::Float(f as f32)),
            Schema::Double => self.double(json, path, "double").map(Value::Double),
            Schema::String => match json {
                JsonValue::String(s) => Ok(Value::String(s.clone())),
                JsonValue::Number(n) if self.lenient => Ok(Value::String(n.to_string())),
                JsonValue::Bool(b) if self.lenient => Ok(Value::String(b.to_string())),
                _ => Err(mismatch(path, "string", json)),
            },
            Schema::Bytes => self.bytes(json, path, "bytes").map(Value::Bytes),
            Schema::Uuid => match json {
                JsonValue::String(s) => uuid::Uuid::parse_str(s)
                    .map(Value::Uuid)
                    .map_err(|e| encoding(path, format!("invalid uuid: {}", e))),
                _ => Err(mismatch(path, "uuid", json)),
            },
            Schema::Date => self.int(json, path, "date").map(Value::Date),
            Schema::TimeMillis => self.int(json, path, "time-millis").map(Value::TimeMillis),
            Schema::TimeMicros => self.long(json, path, "time-micros").map(Value::TimeMicros),
            Schema::TimestampMillis => self
                .long(json, path, "timestamp-millis")
                .map(Value::TimestampMillis),
            Schema::TimestampMicros => self
                .long(json, path, "timestamp-micros")
                .map(Value::TimestampMicros),
            Schema::LocalTimestampMillis => self
                .long(json, path, "local-timestamp-millis")
                .map(Value::LocalTimestampMillis),
            Schema::LocalTimestampMicros => self
                .long(json, path, "local-timestamp-micros")
                .map(Value::LocalTimestampMicros),
            Schema::TimestampNanos => self
                .long(json, path, "timestamp-nanos")
                .map(Value::TimestampNanos),
            Schema::LocalTimestampNanos => self
                .long(json, path, "local-timestamp-nanos")
                .map(Value::LocalTimestampNanos),
            Schema::Decimal(decimal) => self
                .decimal(json, decimal.precision, decimal.scale, path)
                .map(Value::Decimal),
            Schema::Duration => self.duration(json, path).map(Value::Duration),
            Schema::Array(array) => match json {
                JsonValue::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.convert(item, &array.items, &format!("{}[{}]", path, i)))
                    .collect::<BridgeResult<Vec<_>>>()
                    .map(Value::Array),
                _ => Err(mismatch(path, "array", json)),
            },
            Schema::Map(map) => match json {
                JsonValue::Object(obj) => {
                    let mut out = HashMap::with_capacity(obj.len());
                    for (k, v) in obj {
                        out.insert(
                            k.clone(),
                            self.convert(v, &map.types, &format!("{}.{}", path, k))?,
                        );
                    }
                    Ok(Value::Map(out))
                }
                _ => Err(mismatch(path, "map", json)),
            },
            Schema::Union(union) => self.union(json, union.variants(), path),
            Schema::Record(record) => match json {
                JsonValue::Object(obj) => {
                    let mut fields = Vec::with_capacity(record.fields.len());
                    for field in &record.fields {
                        let field_path = format!("{}.{}", path, field.name);
                        let value = match (obj.get(&field.name), &field.default) {
                            (Some(v), _) => self.convert(v, &field.schema, &field_path)?,
                            (None, Some(default)) => {
                                self.default_value(default, &field.schema, &field_path)?
                            }
                            (None, None) => {
                                return Err(encoding(&field_path, "missing required field"))
                            }
                        };
                        fields.push((field.name.clone(), value));
                    }
                    Ok(Value::Record(fields))
                }
                _ => Err(mismatch(path, "record", json)),
            },
            Schema::Enum(e) => {
                let JsonValue::String(s) = json else {
                    return Err(mismatch(path, "enum", json));
                };
                let exact = e.symbols.iter().position(|sym| sym == s);
                let pos = match exact {
                    Some(pos) => Some(pos),
                    None if self.lenient => {
                        e.symbols.iter().position(|sym| sym.eq_ignore_ascii_case(s))
                    }
                    None => None,
                };
                match pos {
                    Some(pos) => Ok(Value::Enum(pos as u32, e.symbols[pos].clone())),
                    None => Err(encoding(path, format!("unknown enum symbol '{}'", s))),
                }
            }
            Schema::Fixed(fixed) => {
                let bytes = self.bytes(json, path, "fixed")?;
                if bytes.len() != fixed.size {
                    return Err(encoding(
                        path,
                        format!("fixed size mismatch: expected {}, got {}", fixed.size, bytes.len()),
                    ));
                }
                Ok(Value::Fixed(fixed.size, bytes))
            }
            Schema::Ref { name } => {
                let fullname = name.fullname(None);
                let target = self
                    .names
                    .get(&fullname)
                    .ok_or_else(|| encoding(path, format!("unresolved type reference {}", fullname)))?;
                self.convert(json, target, path)
            }
            other => Err(encoding(
                path,
                format!("unsupported schema type {:?}", apache_avro::schema::SchemaKind::from(other)),
            )),
        }
    }

    fn union(&self, json: &JsonValue, variants: &[Schema], path: &str) -> BridgeResult<Value> {
        // Avro JSON encoding: {"<branch name>": value}
        if let JsonValue::Object(obj) = json {
            if let (1, Some((key, inner))) = (obj.len(), obj.iter().next()) {
                for (idx, variant) in variants.iter().enumerate() {
                    if branch_matches(variant, key, self.names) {
                        if let Ok(v) = self.convert(inner, variant, path) {
                            return Ok(Value::Union(idx as u32, Box::new(v)));
                        }
                    }
                }
            }
        }

        let strict = self.strict();
        let mut passes = vec![&strict];
        if self.lenient {
            passes.push(self);
        }
        for converter in passes {
            for (idx, variant) in variants.iter().enumerate() {
                if let Ok(v) = converter.convert(json, variant, path) {
                    return Ok(Value::Union(idx as u32, Box::new(v)));
                }
            }
        }
        Err(encoding(path, format!("no union branch accepts {}", json)))
    }

    /// Defaults for unions apply to the first branch
    fn default_value(&self, default: &JsonValue, schema: &Schema, path: &str) -> BridgeResult<Value> {
        let converter = JsonToAvro {
            names: self.names,
            lenient: self.lenient,
            defaults: true,
        };
        match schema {
            Schema::Union(union) => match union.variants().first() {
                Some(first) => converter
                    .convert(default, first, path)
                    .map(|v| Value::Union(0, Box::new(v))),
                None => Err(encoding(path, "empty union")),
            },
            _ => converter.convert(default, schema, path),
        }
    }

    fn long(&self, json: &JsonValue, path: &str, expected: &str) -> BridgeResult<i64> {
        let parsed = match json {
            JsonValue::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            JsonValue::String(s) if self.lenient => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| mismatch(path, expected, json))
    }

    fn int(&self, json: &JsonValue, path: &str, expected: &str) -> BridgeResult<i32> {
        let wide = self.long(json, path, expected)?;
        i32::try_from(wide).map_err(|_| encoding(path, format!("{} out of {} range", wide, expected)))
    }

    fn double(&self, json: &JsonValue, path: &str, expected: &str) -> BridgeResult<f64> {
        let parsed = match json {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) if self.lenient => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| mismatch(path, expected, json))
    }

    /// Payload bytes are base64, default bytes are ISO-8859-1
    fn bytes(&self, json: &JsonValue, path: &str, expected: &str) -> BridgeResult<Vec<u8>> {
        match json {
            JsonValue::String(s) if self.defaults => latin1(s, path),
            JsonValue::String(s) => base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|e| encoding(path, format!("invalid base64: {}", e))),
            _ => Err(mismatch(path, expected, json)),
        }
    }

    fn decimal(
        &self,
        json: &JsonValue,
        precision: usize,
        scale: usize,
        path: &str,
    ) -> BridgeResult<apache_avro::Decimal> {
        let text = match json {
            JsonValue::String(s) if self.defaults => {
                return latin1(s, path).map(apache_avro::Decimal::from)
            }
            JsonValue::Number(n) => n.to_string(),
            JsonValue::String(s) => s.trim().to_string(),
            _ => return Err(mismatch(path, "decimal", json)),
        };
        let mut value = Decimal::from_str_exact(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|_| mismatch(path, "decimal", json))?;

        let scale = u32::try_from(scale)
            .map_err(|_| encoding(path, format!("unsupported decimal scale {}", scale)))?;
        if value.normalize().scale() > scale {
            return Err(encoding(
                path,
                format!("{} has more than {} fractional digits", text, scale),
            ));
        }
        value.rescale(scale);

        let unscaled = value.mantissa();
        if unscaled.unsigned_abs().to_string().len() > precision {
            return Err(encoding(
                path,
                format!("{} exceeds decimal precision {}", text, precision),
            ));
        }
        Ok(apache_avro::Decimal::from(unscaled_to_bytes(unscaled)))
    }

    fn duration(&self, json: &JsonValue, path: &str) -> BridgeResult<apache_avro::Duration> {
        match json {
            JsonValue::String(s) if self.defaults => {
                let bytes: [u8; 12] = latin1(s, path)?
                    .try_into()
                    .map_err(|_| encoding(path, "duration default must be 12 bytes"))?;
                Ok(apache_avro::Duration::from(bytes))
            }
            JsonValue::Object(obj) => {
                let part = |name: &str| -> BridgeResult<u32> {
                    let part_path = format!("{}.{}", path, name);
                    let value = obj
                        .get(name)
                        .ok_or_else(|| encoding(&part_path, "missing duration part"))?;
                    let wide = self.long(value, &part_path, "duration part")?;
                    u32::try_from(wide)
                        .map_err(|_| encoding(&part_path, format!("{} out of duration range", wide)))
                };
                Ok(apache_avro::Duration::new(
                    Months::new(part("months")?),
                    Days::new(part("days")?),
                    Millis::new(part("millis")?),
                ))
            }
            _ => Err(mismatch(path, "duration", json)),
        }
    }
}

fn latin1(text: &str, path: &str) -> BridgeResult<Vec<u8>> {
    text.chars()
        .map(|c| {
            u8::try_from(c)
                .map_err(|_| encoding(path, format!("{:?} is outside ISO-8859-1", c)))
        })
        .collect()
}

/// Minimal big-endian two's complement form of `value`
fn unscaled_to_bytes(value: i128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Sign-extend big-endian two's complement bytes; `None` past 128 bits
fn unscaled_from_bytes(bytes: &[u8]) -> Option<i128> {
    if bytes.len() > 16 {
        return None;
    }
    let fill = if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        0xff
    } else {
        0x00
    };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Some(i128::from_be_bytes(buf))
}

fn branch_matches(variant: &Schema, key: &str, names: &HashMap<String, Schema>) -> bool {
    let named = |name: &apache_avro::schema::Name| key == name.name || key == name.fullname(None);
    match variant {
        Schema::Null => key == "null",
        Schema::Boolean => key == "boolean",
        Schema::Int => key == "int",
        Schema::Long => key == "long",
        Schema::Float => key == "float",
        Schema::Double => key == "double",
        Schema::Bytes => key == "bytes",
        Schema::String => key == "string",
        Schema::Array(_) => key == "array",
        Schema::Map(_) => key == "map",
        Schema::Record(r) => named(&r.name),
        Schema::Enum(e) => named(&e.name),
        Schema::Fixed(f) => named(&f.name),
        Schema::Ref { name } => {
            named(name) || names.get(&name.fullname(None)).is_some_and(|s| branch_matches(s, key, names))
        }
        _ => false,
    }
}

fn encoding(path: &str, reason: impl std::fmt::Display) -> BridgeError {
    BridgeError::Encoding(format!("{}: {}", path, reason))
}

fn mismatch(path: &str, expected: &str, actual: &JsonValue) -> BridgeError {
    encoding(path, format!("cannot coerce {} to {}", actual, expected))
}

/// Convert a decoded Avro value to JSON without a schema.
///
/// Decimals come out as base64 of their unscaled bytes, since the scale
/// lives in the schema. [`AvroDecoder::decode`] renders them scaled.
pub fn avro_to_json(avro: &Value) -> BridgeResult<JsonValue> {
    let names = HashMap::new();
    AvroToJson { names: &names }.convert(avro, None)
}

fn b64(bytes: &[u8]) -> JsonValue {
    JsonValue::String(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Walks a decoded value alongside its writer schema, when known
struct AvroToJson<'a> {
    names: &'a HashMap<String, Schema>,
}

impl AvroToJson<'_> {
    fn convert(&self, avro: &Value, schema: Option<&Schema>) -> BridgeResult<JsonValue> {
        let schema = match schema {
            Some(Schema::Ref { name }) => self.names.get(&name.fullname(None)),
            other => other,
        };
        match avro {
            Value::Null => Ok(JsonValue::Null),
            Value::Boolean(b) => Ok(JsonValue::Bool(*b)),
            Value::Int(i) | Value::Date(i) | Value::TimeMillis(i) => Ok(JsonValue::from(*i)),
            Value::Long(l)
            | Value::TimeMicros(l)
            | Value::TimestampMillis(l)
            | Value::TimestampMicros(l)
            | Value::TimestampNanos(l)
            | Value::LocalTimestampMillis(l)
            | Value::LocalTimestampMicros(l)
            | Value::LocalTimestampNanos(l) => Ok(JsonValue::from(*l)),
            Value::Float(f) => Ok(serde_json::json!(*f)),
            Value::Double(d) => Ok(serde_json::json!(*d)),
            Value::String(s) => Ok(JsonValue::String(s.clone())),
            Value::Bytes(b) => Ok(b64(b)),
            Value::Fixed(_, b) => Ok(b64(b)),
            Value::Uuid(u) => Ok(JsonValue::String(u.to_string())),
            Value::Enum(_, symbol) => Ok(JsonValue::String(symbol.clone())),
            Value::Decimal(decimal) => {
                let bytes = Vec::<u8>::try_from(decimal)
                    .map_err(|e| BridgeError::Decoding(format!("invalid decimal: {}", e)))?;
                let scaled = match schema {
                    Some(Schema::Decimal(decimal_schema)) => u32::try_from(decimal_schema.scale)
                        .ok()
                        .zip(unscaled_from_bytes(&bytes))
                        .and_then(|(scale, unscaled)| {
                            Decimal::try_from_i128_with_scale(unscaled, scale).ok()
                        }),
                    _ => None,
                };
                Ok(scaled.map_or_else(|| b64(&bytes), |d| JsonValue::String(d.to_string())))
            }
            Value::BigDecimal(decimal) => Ok(JsonValue::String(decimal.to_string())),
            Value::Duration(duration) => Ok(serde_json::json!({
                "months": u32::from(duration.months()),
                "days": u32::from(duration.days()),
                "millis": u32::from(duration.millis()),
            })),
            Value::Union(idx, inner) => {
                let branch = match schema {
                    Some(Schema::Union(union)) => union.variants().get(*idx as usize),
                    _ => None,
                };
                self.convert(inner, branch)
            }
            Value::Array(items) => {
                let item_schema = match schema {
                    Some(Schema::Array(array)) => Some(&*array.items),
                    _ => None,
                };
                items
                    .iter()
                    .map(|item| self.convert(item, item_schema))
                    .collect::<BridgeResult<Vec<_>>>()
                    .map(JsonValue::Array)
            }
            Value::Map(map) => {
                let value_schema = match schema {
                    Some(Schema::Map(map_schema)) => Some(&*map_schema.types),
                    _ => None,
                };
                let mut obj = serde_json::Map::new();
                for (k, v) in map {
                    obj.insert(k.clone(), self.convert(v, value_schema)?);
                }
                Ok(JsonValue::Object(obj))
            }
            Value::Record(fields) => {
                let record = match schema {
                    Some(Schema::Record(record)) => Some(record),
                    _ => None,
                };
                let mut obj = serde_json::Map::new();
                for (name, value) in fields {
                    let field_schema = record
                        .and_then(|r| r.fields.iter().find(|f| &f.name == name))
                        .map(|f| &f.schema);
                    obj.insert(name.clone(), self.convert(value, field_schema)?);
                }
                Ok(JsonValue::Object(obj))
            }
            #[allow(unreachable_patterns)]
            other => Err(BridgeError::Decoding(format!(
                "unsupported Avro value: {:?}",
                other
            ))),
        }
    }
}
