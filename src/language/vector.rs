//! Element-wise kernels over flat and jagged numeric columns.

use crate::array::{Array, JaggedArray};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Data {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
}

impl Data {
    fn len(&self) -> usize {
        match self {
            Data::Int(v) => v.len(),
            Data::Float(v) => v.len(),
            Data::Bool(v) => v.len(),
        }
    }

    fn take(&self, indices: &[usize]) -> Data {
        match self {
            Data::Int(v) => Data::Int(indices.iter().map(|&i| v[i]).collect()),
            Data::Float(v) => Data::Float(indices.iter().map(|&i| v[i]).collect()),
            Data::Bool(v) => Data::Bool(indices.iter().map(|&i| v[i]).collect()),
        }
    }

    pub(crate) fn floats(&self) -> Vec<f64> {
        match self {
            Data::Int(v) => v.iter().map(|x| *x as f64).collect(),
            Data::Float(v) => v.clone(),
            Data::Bool(v) => v.iter().map(|b| f64::from(u8::from(*b))).collect(),
        }
    }

    /// Integer view; `None` when the values are floating point.
    fn ints(&self) -> Option<Vec<i64>> {
        match self {
            Data::Int(v) => Some(v.clone()),
            Data::Bool(v) => Some(v.iter().map(|b| i64::from(*b)).collect()),
            Data::Float(_) => None,
        }
    }

    pub(crate) fn truthy(&self) -> Vec<bool> {
        match self {
            Data::Int(v) => v.iter().map(|x| *x != 0).collect(),
            Data::Float(v) => v.iter().map(|x| *x != 0.0).collect(),
            Data::Bool(v) => v.clone(),
        }
    }

    fn into_array(self) -> Array {
        match self {
            Data::Int(v) => Array::Int64(v),
            Data::Float(v) => Array::Float64(v),
            Data::Bool(v) => Array::Bool(v),
        }
    }

    fn from_flat(array: &Array) -> Option<Data> {
        Some(match array {
            Array::Bool(v) => Data::Bool(v.clone()),
            Array::Int32(v) => Data::Int(v.iter().map(|x| i64::from(*x)).collect()),
            Array::Int64(v) => Data::Int(v.clone()),
            Array::Float32(v) => Data::Float(v.iter().map(|x| f64::from(*x)).collect()),
            Array::Float64(v) => Data::Float(v.clone()),
            _ => return None,
        })
    }
}

/// A numeric operand: a scalar, one value per entry, or a list per entry.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Operand {
    pub(crate) data: Data,
    pub(crate) offsets: Option<Vec<usize>>,
    pub(crate) scalar: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Atan2,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Xor,
}

impl Operand {
    pub(crate) fn int(value: i64) -> Self {
        Operand::scalar(Data::Int(vec![value]))
    }

    pub(crate) fn float(value: f64) -> Self {
        Operand::scalar(Data::Float(vec![value]))
    }

    pub(crate) fn boolean(value: bool) -> Self {
        Operand::scalar(Data::Bool(vec![value]))
    }

    fn scalar(data: Data) -> Self {
        Operand {
            data,
            offsets: None,
            scalar: true,
        }
    }

    fn column(data: Data, offsets: Option<Vec<usize>>) -> Self {
        Operand {
            data,
            offsets,
            scalar: false,
        }
    }

    pub(crate) fn from_array(array: &Array) -> Result<Self, String> {
        if let Some(data) = Data::from_flat(array) {
            return Ok(Operand::column(data, None));
        }
        match array {
            Array::Jagged(jagged) => {
                let data = Data::from_flat(jagged.content()).ok_or_else(|| {
                    format!("lists of {} are not numeric", jagged.content().type_name())
                })?;
                Ok(Operand::column(data, Some(jagged.offsets().to_vec())))
            }
            other => Err(format!("{} values are not numeric", other.type_name())),
        }
    }

    /// Converts back to an array; a scalar becomes a one-element array.
    pub(crate) fn into_array(self) -> Result<Array, String> {
        let content = self.data.into_array();
        match self.offsets {
            Some(offsets) => JaggedArray::new(offsets, content)
                .map(Array::Jagged)
                .map_err(|err| err.to_string()),
            None => Ok(content),
        }
    }

    /// Scalar broadcast to `len` entries; columns are returned unchanged.
    pub(crate) fn into_array_of_len(self, len: usize) -> Result<Array, String> {
        if self.scalar {
            let data = self.data.take(&vec![0; len]);
            return Operand::column(data, None).into_array();
        }
        self.into_array()
    }

    fn num_entries(&self) -> usize {
        match &self.offsets {
            Some(offsets) => offsets.len() - 1,
            None => self.data.len(),
        }
    }

    pub(crate) fn map_float(self, f: impl Fn(f64) -> f64) -> Operand {
        let data = Data::Float(self.data.floats().into_iter().map(f).collect());
        Operand { data, ..self }
    }

    pub(crate) fn negate(self) -> Operand {
        match self.data {
            Data::Float(ref v) => {
                let data = Data::Float(v.iter().map(|x| -x).collect());
                Operand { data, ..self }
            }
            _ => {
                let ints = self.data.ints().unwrap_or_default();
                let data = Data::Int(ints.into_iter().map(|x| x.wrapping_neg()).collect());
                Operand { data, ..self }
            }
        }
    }

    pub(crate) fn abs(self) -> Operand {
        match self.data {
            Data::Float(_) => self.map_float(f64::abs),
            _ => {
                let ints = self.data.ints().unwrap_or_default();
                let data = Data::Int(ints.into_iter().map(|x| x.wrapping_abs()).collect());
                Operand { data, ..self }
            }
        }
    }

    pub(crate) fn not(self) -> Operand {
        let data = Data::Bool(self.data.truthy().into_iter().map(|b| !b).collect());
        Operand { data, ..self }
    }

    /// Number of items in each list.
    pub(crate) fn counts(self) -> Result<Operand, String> {
        let offsets = self.offsets.ok_or("num() needs a list per entry")?;
        let counts = offsets.windows(2).map(|w| (w[1] - w[0]) as i64).collect();
        Ok(Operand::column(Data::Int(counts), None))
    }

    /// Sum of each list.
    pub(crate) fn sums(self) -> Result<Operand, String> {
        let offsets = self.offsets.ok_or("sum() needs a list per entry")?;
        let data = match self.data.ints() {
            Some(ints) => Data::Int(
                offsets
                    .windows(2)
                    .map(|w| ints[w[0]..w[1]].iter().fold(0i64, |acc, x| acc.wrapping_add(*x)))
                    .collect(),
            ),
            None => {
                let floats = self.data.floats();
                Data::Float(
                    offsets
                        .windows(2)
                        .map(|w| floats[w[0]..w[1]].iter().sum())
                        .collect(),
                )
            }
        };
        Ok(Operand::column(data, None))
    }

    pub(crate) fn binary(self, kind: BinaryKind, right: Operand) -> Result<Operand, String> {
        let (left, right, offsets, scalar) = broadcast(self, right)?;
        let data = apply(kind, &left, &right)?;
        Ok(Operand {
            data,
            offsets,
            scalar,
        })
    }
}

type Broadcast = (Data, Data, Option<Vec<usize>>, bool);

fn broadcast(left: Operand, right: Operand) -> Result<Broadcast, String> {
    match (left.scalar, right.scalar) {
        (true, true) => return Ok((left.data, right.data, None, true)),
        (true, false) => {
            let data = left.data.take(&vec![0; right.data.len()]);
            return Ok((data, right.data, right.offsets, false));
        }
        (false, true) => {
            let data = right.data.take(&vec![0; left.data.len()]);
            return Ok((left.data, data, left.offsets, false));
        }
        (false, false) => {}
    }

    if left.num_entries() != right.num_entries() {
        return Err(format!(
            "cannot combine {} entries with {} entries",
            left.num_entries(),
            right.num_entries()
        ));
    }
    match (left.offsets, right.offsets) {
        (None, None) => Ok((left.data, right.data, None, false)),
        (Some(offsets), None) => {
            let data = right.data.take(&repeat_per_list(&offsets));
            Ok((left.data, data, Some(offsets), false))
        }
        (None, Some(offsets)) => {
            let data = left.data.take(&repeat_per_list(&offsets));
            Ok((data, right.data, Some(offsets), false))
        }
        (Some(l), Some(r)) => {
            if l != r {
                return Err("list lengths differ between operands".to_string());
            }
            Ok((left.data, right.data, Some(l), false))
        }
    }
}

fn repeat_per_list(offsets: &[usize]) -> Vec<usize> {
    offsets
        .windows(2)
        .enumerate()
        .flat_map(|(entry, w)| std::iter::repeat(entry).take(w[1] - w[0]))
        .collect()
}

fn apply(kind: BinaryKind, left: &Data, right: &Data) -> Result<Data, String> {
    use BinaryKind::*;
    let ints = left.ints().zip(right.ints());
    Ok(match kind {
        Add | Sub | Mul => match ints {
            Some((l, r)) => Data::Int(
                l.iter()
                    .zip(&r)
                    .map(|(a, b)| match kind {
                        Add => a.wrapping_add(*b),
                        Sub => a.wrapping_sub(*b),
                        _ => a.wrapping_mul(*b),
                    })
                    .collect(),
            ),
            None => float_op(left, right, |a, b| match kind {
                Add => a + b,
                Sub => a - b,
                _ => a * b,
            }),
        },
        Mod => match ints {
            Some((l, r)) => Data::Int(
                l.iter()
                    .zip(&r)
                    .map(|(a, b)| a.checked_rem_euclid(*b).ok_or("integer modulo by zero"))
                    .collect::<Result<Vec<i64>, _>>()?,
            ),
            None => float_op(left, right, f64::rem_euclid),
        },
        Div => float_op(left, right, |a, b| a / b),
        Pow => float_op(left, right, f64::powf),
        Atan2 => float_op(left, right, f64::atan2),
        Eq | NotEq | Lt | LtEq | Gt | GtEq => {
            let compare = |ord: std::cmp::Ordering| match kind {
                Eq => ord.is_eq(),
                NotEq => ord.is_ne(),
                Lt => ord.is_lt(),
                LtEq => ord.is_le(),
                Gt => ord.is_gt(),
                _ => ord.is_ge(),
            };
            match ints {
                Some((l, r)) => Data::Bool(l.iter().zip(&r).map(|(a, b)| compare(a.cmp(b))).collect()),
                None => Data::Bool(
                    left.floats()
                        .iter()
                        .zip(right.floats())
                        .map(|(a, b)| a.partial_cmp(&b).is_some_and(compare))
                        .collect(),
                ),
            }
        }
        And | Or | Xor => Data::Bool(
            left.truthy()
                .into_iter()
                .zip(right.truthy())
                .map(|(a, b)| match kind {
                    And => a && b,
                    Or => a || b,
                    _ => a ^ b,
                })
                .collect(),
        ),
    })
}

fn float_op(left: &Data, right: &Data, f: impl Fn(f64, f64) -> f64) -> Data {
    Data::Float(
        left.floats()
            .into_iter()
            .zip(right.floats())
            .map(|(a, b)| f(a, b))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jagged(rows: &[&[i64]]) -> Operand {
        let mut offsets = vec![0];
        let mut content = Vec::new();
        for row in rows {
            content.extend_from_slice(row);
            offsets.push(content.len());
        }
        Operand::column(Data::Int(content), Some(offsets))
    }

    #[test]
    fn integer_arithmetic_stays_integer() {
        let column = Operand::column(Data::Int(vec![1, 2, 3]), None);
        let out = column.binary(BinaryKind::Add, Operand::int(1)).unwrap();
        assert_eq!(out.into_array().unwrap(), Array::Int64(vec![2, 3, 4]));
    }

    #[test]
    fn division_promotes_to_float() {
        let column = Operand::column(Data::Int(vec![1, 2]), None);
        let out = column.binary(BinaryKind::Div, Operand::int(2)).unwrap();
        assert_eq!(out.into_array().unwrap(), Array::Float64(vec![0.5, 1.0]));
    }

    #[test]
    fn flat_broadcasts_into_lists() {
        let lists = jagged(&[&[1, 2], &[], &[3]]);
        let per_entry = Operand::column(Data::Int(vec![10, 20, 30]), None);
        let out = lists.binary(BinaryKind::Mul, per_entry).unwrap();
        assert_eq!(out.into_array().unwrap(), jagged(&[&[10, 20], &[], &[90]]).into_array().unwrap());
    }

    #[test]
    fn mismatched_lengths_fail() {
        let a = Operand::column(Data::Int(vec![1, 2]), None);
        let b = Operand::column(Data::Int(vec![1]), None);
        assert!(a.binary(BinaryKind::Add, b).is_err());
    }

    #[test]
    fn counts_and_sums_per_entry() {
        let lists = jagged(&[&[1, 2], &[], &[3]]);
        assert_eq!(
            lists.clone().counts().unwrap().into_array().unwrap(),
            Array::Int64(vec![2, 0, 1])
        );
        assert_eq!(
            lists.sums().unwrap().into_array().unwrap(),
            Array::Int64(vec![3, 0, 3])
        );
    }

    #[test]
    fn modulo_by_zero_is_an_error() {
        let column = Operand::column(Data::Int(vec![1]), None);
        assert!(column.binary(BinaryKind::Mod, Operand::int(0)).is_err());
    }
}
