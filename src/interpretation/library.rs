//! Output containers for materialized arrays.

use crate::array::{Array, RecordArray};
use crate::error::{ReadError, Result};
use std::fmt;

/// Shape of the value returned for a set of expressions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum How {
    /// Name-to-array pairs in request order.
    #[default]
    Dict,
    Tuple,
    List,
    /// A single record array with one field per expression.
    Record,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Columns {
    Dict(Vec<(String, Array)>),
    Tuple(Vec<Array>),
    List(Vec<Array>),
    Record(Array),
}

/// Grouped output of one materialization, tagged with the entry number of
/// its first row.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayGroup {
    columns: Columns,
    entry_start: u64,
}

impl ArrayGroup {
    pub fn new(columns: Columns) -> Self {
        ArrayGroup {
            columns,
            entry_start: 0,
        }
    }

    pub(crate) fn starting_at(mut self, entry_start: u64) -> Self {
        self.entry_start = entry_start;
        self
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn into_columns(self) -> Columns {
        self.columns
    }

    pub fn entry_start(&self) -> u64 {
        self.entry_start
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        match &self.columns {
            Columns::Dict(pairs) => pairs.len(),
            Columns::Tuple(arrays) | Columns::List(arrays) => arrays.len(),
            Columns::Record(array) => array.as_record().map_or(1, |r| r.fields().len()),
        }
    }

    /// Number of entries shared by every column.
    pub fn num_entries(&self) -> usize {
        match &self.columns {
            Columns::Dict(pairs) => pairs.first().map_or(0, |(_, a)| a.len()),
            Columns::Tuple(arrays) | Columns::List(arrays) => arrays.first().map_or(0, Array::len),
            Columns::Record(array) => array.len(),
        }
    }

    /// Column by output name; positional shapes have no names.
    pub fn get(&self, name: &str) -> Option<&Array> {
        match &self.columns {
            Columns::Dict(pairs) => pairs.iter().find(|(n, _)| n == name).map(|(_, a)| a),
            Columns::Record(array) => array.as_record().and_then(|r| r.field(name)),
            Columns::Tuple(_) | Columns::List(_) => None,
        }
    }

    /// Columns in order, without names.
    pub fn arrays(&self) -> Vec<&Array> {
        match &self.columns {
            Columns::Dict(pairs) => pairs.iter().map(|(_, a)| a).collect(),
            Columns::Tuple(arrays) | Columns::List(arrays) => arrays.iter().collect(),
            Columns::Record(array) => match array.as_record() {
                Some(record) => record.fields().iter().map(|(_, a)| a).collect(),
                None => vec![array],
            },
        }
    }
}

/// Builds and combines output containers.
pub trait Library: Send + Sync + fmt::Debug {
    /// Part of every cache key, so different libraries never share entries.
    fn name(&self) -> &str;

    fn group(&self, fields: Vec<(String, Array)>, how: How) -> Result<ArrayGroup>;

    /// Joins groups of identical shape end to end.
    fn concatenate(&self, groups: Vec<ArrayGroup>) -> Result<ArrayGroup>;

    /// Renumbers a group's entries by adding `global_offset`.
    fn global_index(&self, group: ArrayGroup, global_offset: u64) -> ArrayGroup;
}

/// The library producing plain [`Array`] values.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArrayLibrary;

impl Library for ArrayLibrary {
    fn name(&self) -> &str {
        "arrays"
    }

    fn group(&self, fields: Vec<(String, Array)>, how: How) -> Result<ArrayGroup> {
        let columns = match how {
            How::Dict => Columns::Dict(fields),
            How::Tuple => Columns::Tuple(fields.into_iter().map(|(_, a)| a).collect()),
            How::List => Columns::List(fields.into_iter().map(|(_, a)| a).collect()),
            How::Record => Columns::Record(Array::Record(RecordArray::new(fields)?)),
        };
        Ok(ArrayGroup::new(columns))
    }

    fn concatenate(&self, groups: Vec<ArrayGroup>) -> Result<ArrayGroup> {
        let mut groups = groups.into_iter();
        let Some(first) = groups.next() else {
            return Err(ReadError::mismatch("cannot concatenate zero groups"));
        };
        let entry_start = first.entry_start;
        let mut columns = first.columns;
        for group in groups {
            columns = match (columns, group.columns) {
                (Columns::Dict(left), Columns::Dict(right)) => {
                    if left.len() != right.len() || left.iter().zip(&right).any(|(l, r)| l.0 != r.0) {
                        return Err(ReadError::mismatch("groups have different column names"));
                    }
                    Columns::Dict(
                        left.into_iter()
                            .zip(right)
                            .map(|((name, l), (_, r))| Ok((name, Array::concat(&[l, r])?)))
                            .collect::<Result<Vec<_>>>()?,
                    )
                }
                (Columns::Tuple(left), Columns::Tuple(right)) => Columns::Tuple(concat_positional(left, right)?),
                (Columns::List(left), Columns::List(right)) => Columns::List(concat_positional(left, right)?),
                (Columns::Record(left), Columns::Record(right)) => {
                    Columns::Record(Array::concat(&[left, right])?)
                }
                _ => return Err(ReadError::mismatch("groups have different shapes")),
            };
        }
        Ok(ArrayGroup {
            columns,
            entry_start,
        })
    }

    fn global_index(&self, group: ArrayGroup, global_offset: u64) -> ArrayGroup {
        let entry_start = group.entry_start + global_offset;
        group.starting_at(entry_start)
    }
}

fn concat_positional(left: Vec<Array>, right: Vec<Array>) -> Result<Vec<Array>> {
    if left.len() != right.len() {
        return Err(ReadError::mismatch("groups have different widths"));
    }
    left.into_iter()
        .zip(right)
        .map(|(l, r)| Array::concat(&[l, r]))
        .collect()
}
