use crate::error::{ReadError, Result};

/// A fully materialized column, or a fragment of one decoded from a single basket.
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Strings(Vec<String>),
    Jagged(JaggedArray),
    Record(RecordArray),
}

/// Variable-length entries: entry `i` is `content[offsets[i]..offsets[i + 1]]`.
///
/// `offsets` always starts at zero and ends at `content.len()`.
#[derive(Clone, Debug, PartialEq)]
pub struct JaggedArray {
    offsets: Vec<usize>,
    content: Box<Array>,
}

/// Struct-like array synthesized from sibling branches of equal length.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordArray {
    fields: Vec<(String, Array)>,
    len: usize,
}

macro_rules! map_flat {
    ($array:expr, $values:ident => $body:expr, $other:ident => $fallback:expr) => {
        match $array {
            Array::Bool($values) => Array::Bool($body),
            Array::Int32($values) => Array::Int32($body),
            Array::Int64($values) => Array::Int64($body),
            Array::Float32($values) => Array::Float32($body),
            Array::Float64($values) => Array::Float64($body),
            Array::Strings($values) => Array::Strings($body),
            $other => $fallback,
        }
    };
}

impl Array {
    pub fn len(&self) -> usize {
        match self {
            Array::Bool(v) => v.len(),
            Array::Int32(v) => v.len(),
            Array::Int64(v) => v.len(),
            Array::Float32(v) => v.len(),
            Array::Float64(v) => v.len(),
            Array::Strings(v) => v.len(),
            Array::Jagged(jagged) => jagged.len(),
            Array::Record(record) => record.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> String {
        match self {
            Array::Bool(_) => "bool".to_string(),
            Array::Int32(_) => "int32".to_string(),
            Array::Int64(_) => "int64".to_string(),
            Array::Float32(_) => "float32".to_string(),
            Array::Float64(_) => "float64".to_string(),
            Array::Strings(_) => "string".to_string(),
            Array::Jagged(jagged) => format!("var * {}", jagged.content.type_name()),
            Array::Record(record) => {
                let fields: Vec<String> = record
                    .fields
                    .iter()
                    .map(|(name, array)| format!("{name}: {}", array.type_name()))
                    .collect();
                format!("{{{}}}", fields.join(", "))
            }
        }
    }

    /// An array of the same type with no entries.
    pub fn empty_like(&self) -> Array {
        self.slice(0, 0)
    }

    /// Copies entries `[start, stop)`, clamped to the array bounds.
    pub fn slice(&self, start: usize, stop: usize) -> Array {
        let len = self.len();
        let stop = stop.min(len);
        let start = start.min(stop);
        map_flat!(self, values => values[start..stop].to_vec(), other => match other {
            Array::Jagged(jagged) => Array::Jagged(jagged.slice(start, stop)),
            Array::Record(record) => Array::Record(record.slice(start, stop)),
            _ => unreachable!("flat variants handled above"),
        })
    }

    /// Keeps the entries whose mask value is true.
    pub fn filter(&self, mask: &[bool]) -> Result<Array> {
        if mask.len() != self.len() {
            return Err(ReadError::mismatch(format!(
                "mask of length {} applied to array of length {}",
                mask.len(),
                self.len()
            )));
        }
        Ok(map_flat!(self, values => keep(values, mask), other => match other {
            Array::Jagged(jagged) => Array::Jagged(jagged.filter(mask)),
            Array::Record(record) => {
                let fields = record
                    .fields
                    .iter()
                    .map(|(name, array)| Ok((name.clone(), array.filter(mask)?)))
                    .collect::<Result<Vec<_>>>()?;
                Array::Record(RecordArray {
                    fields,
                    len: mask.iter().filter(|keep| **keep).count(),
                })
            }
            _ => unreachable!("flat variants handled above"),
        }))
    }

    /// Joins arrays of identical type end to end.
    pub fn concat(parts: &[Array]) -> Result<Array> {
        let Some(first) = parts.first() else {
            return Err(ReadError::mismatch("cannot concatenate zero arrays"));
        };
        if parts.len() == 1 {
            return Ok(first.clone());
        }
        match first {
            Array::Bool(_) => Ok(Array::Bool(gather_flat(parts, |a| match a {
                Array::Bool(v) => Some(v),
                _ => None,
            })?)),
            Array::Int32(_) => Ok(Array::Int32(gather_flat(parts, |a| match a {
                Array::Int32(v) => Some(v),
                _ => None,
            })?)),
            Array::Int64(_) => Ok(Array::Int64(gather_flat(parts, |a| match a {
                Array::Int64(v) => Some(v),
                _ => None,
            })?)),
            Array::Float32(_) => Ok(Array::Float32(gather_flat(parts, |a| match a {
                Array::Float32(v) => Some(v),
                _ => None,
            })?)),
            Array::Float64(_) => Ok(Array::Float64(gather_flat(parts, |a| match a {
                Array::Float64(v) => Some(v),
                _ => None,
            })?)),
            Array::Strings(_) => Ok(Array::Strings(gather_flat(parts, |a| match a {
                Array::Strings(v) => Some(v),
                _ => None,
            })?)),
            Array::Jagged(_) => {
                let mut offsets = vec![0usize];
                let mut contents = Vec::with_capacity(parts.len());
                for part in parts {
                    let Array::Jagged(jagged) = part else {
                        return Err(type_mismatch(first, part));
                    };
                    let base = offsets.last().copied().unwrap_or(0);
                    offsets.extend(jagged.offsets[1..].iter().map(|o| o + base));
                    contents.push(jagged.content.as_ref().clone());
                }
                let content = Array::concat(&contents)?;
                Ok(Array::Jagged(JaggedArray::new(offsets, content)?))
            }
            Array::Record(record) => {
                let mut fields = Vec::with_capacity(record.fields.len());
                for (name, _) in &record.fields {
                    let mut columns = Vec::with_capacity(parts.len());
                    for part in parts {
                        let Array::Record(other) = part else {
                            return Err(type_mismatch(first, part));
                        };
                        let column = other.field(name).ok_or_else(|| {
                            ReadError::mismatch(format!("record field {name:?} missing"))
                        })?;
                        columns.push(column.clone());
                    }
                    fields.push((name.clone(), Array::concat(&columns)?));
                }
                let len = parts.iter().map(Array::len).sum();
                Ok(Array::Record(RecordArray { fields, len }))
            }
        }
    }

    /// Approximate heap footprint, used to bound the array cache.
    pub fn nbytes(&self) -> usize {
        match self {
            Array::Bool(v) => v.len(),
            Array::Int32(v) => v.len() * 4,
            Array::Int64(v) => v.len() * 8,
            Array::Float32(v) => v.len() * 4,
            Array::Float64(v) => v.len() * 8,
            Array::Strings(v) => v.iter().map(|s| s.len() + std::mem::size_of::<String>()).sum(),
            Array::Jagged(jagged) => {
                jagged.offsets.len() * std::mem::size_of::<usize>() + jagged.content.nbytes()
            }
            Array::Record(record) => record.fields.iter().map(|(_, a)| a.nbytes()).sum(),
        }
    }

    pub fn as_jagged(&self) -> Option<&JaggedArray> {
        match self {
            Array::Jagged(jagged) => Some(jagged),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordArray> {
        match self {
            Array::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Numeric values widened to f64; `None` for non-numeric arrays.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Array::Bool(v) => Some(v.iter().map(|b| if *b { 1.0 } else { 0.0 }).collect()),
            Array::Int32(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Array::Int64(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Array::Float32(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Array::Float64(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Integer values widened to i64; `None` unless the array holds integers.
    pub fn to_i64(&self) -> Option<Vec<i64>> {
        match self {
            Array::Int32(v) => Some(v.iter().map(|x| *x as i64).collect()),
            Array::Int64(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl JaggedArray {
    pub fn new(offsets: Vec<usize>, content: Array) -> Result<Self> {
        let valid = offsets.first() == Some(&0)
            && offsets.last() == Some(&content.len())
            && offsets.windows(2).all(|pair| pair[0] <= pair[1]);
        if !valid {
            return Err(ReadError::mismatch(format!(
                "jagged offsets do not describe content of length {}",
                content.len()
            )));
        }
        Ok(JaggedArray {
            offsets,
            content: Box::new(content),
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn content(&self) -> &Array {
        &self.content
    }

    pub fn counts(&self) -> Vec<usize> {
        self.offsets.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }

    /// Entry `index` as its own flat array.
    pub fn entry(&self, index: usize) -> Array {
        self.content
            .slice(self.offsets[index], self.offsets[index + 1])
    }

    /// Keeps the items whose mask value is true; every entry survives, possibly empty.
    pub fn filter_items(&self, mask: &[bool]) -> Result<JaggedArray> {
        if mask.len() != self.content.len() {
            return Err(ReadError::mismatch(format!(
                "item mask of length {} applied to {} items",
                mask.len(),
                self.content.len()
            )));
        }
        let mut offsets = Vec::with_capacity(self.offsets.len());
        offsets.push(0);
        for pair in self.offsets.windows(2) {
            let kept = mask[pair[0]..pair[1]].iter().filter(|keep| **keep).count();
            offsets.push(offsets[offsets.len() - 1] + kept);
        }
        Ok(JaggedArray {
            offsets,
            content: Box::new(self.content.filter(mask)?),
        })
    }

    fn slice(&self, start: usize, stop: usize) -> JaggedArray {
        let base = self.offsets[start];
        let offsets = self.offsets[start..=stop].iter().map(|o| o - base).collect();
        let content = self.content.slice(base, self.offsets[stop]);
        JaggedArray {
            offsets,
            content: Box::new(content),
        }
    }

    fn filter(&self, mask: &[bool]) -> JaggedArray {
        let mut offsets = vec![0usize];
        let mut content_mask = vec![false; self.content.len()];
        for (index, keep) in mask.iter().enumerate() {
            if !*keep {
                continue;
            }
            let (start, stop) = (self.offsets[index], self.offsets[index + 1]);
            content_mask[start..stop].iter_mut().for_each(|m| *m = true);
            let base = offsets.last().copied().unwrap_or(0);
            offsets.push(base + stop - start);
        }
        let content = self
            .content
            .filter(&content_mask)
            .unwrap_or_else(|_| self.content.empty_like());
        JaggedArray {
            offsets,
            content: Box::new(content),
        }
    }
}

impl RecordArray {
    pub fn new(fields: Vec<(String, Array)>) -> Result<Self> {
        let len = fields.first().map(|(_, a)| a.len()).unwrap_or(0);
        if let Some((name, array)) = fields.iter().find(|(_, a)| a.len() != len) {
            return Err(ReadError::mismatch(format!(
                "record field {name:?} has {} entries, expected {len}",
                array.len()
            )));
        }
        Ok(RecordArray { fields, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn fields(&self) -> &[(String, Array)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Array> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, array)| array)
    }

    fn slice(&self, start: usize, stop: usize) -> RecordArray {
        RecordArray {
            fields: self
                .fields
                .iter()
                .map(|(name, array)| (name.clone(), array.slice(start, stop)))
                .collect(),
            len: stop - start,
        }
    }
}

fn keep<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(value, _)| value.clone())
        .collect()
}

fn gather_flat<T: Clone>(
    parts: &[Array],
    extract: impl Fn(&Array) -> Option<&Vec<T>>,
) -> Result<Vec<T>> {
    let total = parts.iter().map(Array::len).sum();
    let mut out = Vec::with_capacity(total);
    for part in parts {
        let values = extract(part).ok_or_else(|| type_mismatch(&parts[0], part))?;
        out.extend_from_slice(values);
    }
    Ok(out)
}

fn type_mismatch(expected: &Array, found: &Array) -> ReadError {
    ReadError::mismatch(format!(
        "expected {} but found {}",
        expected.type_name(),
        found.type_name()
    ))
}
