//! Persistent collections backing the `List`, `Vector`, `HashMap` and `Set` value variants.
//!
//! Every operation that "changes" a collection returns a new one; the receiver is left
//! untouched. The `im_rc` structures underneath share their nodes between versions, so
//! a new version costs a path copy rather than a full copy.

use std::fmt;

use crate::Error;
use crate::ast::Value;

/// Borrowed iterator over a list or vector
pub type Iter<'a> = im_rc::vector::Iter<'a, Value>;

/// Immutable list. `rest` and `cons` share structure with the receiver.
#[derive(Clone, Default, PartialEq)]
pub struct List(im_rc::Vector<Value>);

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        List(im_rc::Vector::from(items))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> Iter<'_> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&Value> {
        self.0.front()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// All but the first element; the rest of an empty list is empty
    pub fn rest(&self) -> List {
        if self.0.is_empty() {
            self.clone()
        } else {
            List(self.0.skip(1))
        }
    }

    pub fn cons(&self, head: Value) -> List {
        let mut items = self.0.clone();
        items.push_front(head);
        List(items)
    }

    pub(crate) fn as_seq(&self) -> Seq<'_> {
        Seq::Items(&self.0)
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        write_spaced(f, self.iter())?;
        write!(f, ")")
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        List(iter.into_iter().collect())
    }
}

/// Indexed sequence with structure-sharing `append` and `update`
#[derive(Clone, Default, PartialEq)]
pub struct Vector(im_rc::Vector<Value>);

impl Vector {
    pub fn new(items: Vec<Value>) -> Self {
        Vector(im_rc::Vector::from(items))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> Iter<'_> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn append(&self, value: Value) -> Vector {
        let mut items = self.0.clone();
        items.push_back(value);
        Vector(items)
    }

    pub fn update(&self, index: usize, value: Value) -> Result<Vector, Error> {
        if index >= self.len() {
            return Err(Error::EvalError(format!(
                "index {index} out of bounds for vector of length {}",
                self.len()
            )));
        }
        Ok(Vector(self.0.update(index, value)))
    }

    pub(crate) fn as_seq(&self) -> Seq<'_> {
        Seq::Items(&self.0)
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        write_spaced(f, self.iter())?;
        write!(f, "]")
    }
}

impl FromIterator<Value> for Vector {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Vector(iter.into_iter().collect())
    }
}

/// Read-only view over the elements of a list, a vector, nil, or a builtin's
/// argument slice.
#[derive(Clone, Copy)]
pub enum Seq<'a> {
    Slice(&'a [Value]),
    Items(&'a im_rc::Vector<Value>),
}

impl<'a> Seq<'a> {
    pub const EMPTY: Seq<'static> = Seq::Slice(&[]);

    pub fn len(self) -> usize {
        match self {
            Seq::Slice(items) => items.len(),
            Seq::Items(items) => items.len(),
        }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub fn get(self, index: usize) -> Option<&'a Value> {
        match self {
            Seq::Slice(items) => items.get(index),
            Seq::Items(items) => items.get(index),
        }
    }

    pub fn first(self) -> Option<&'a Value> {
        self.get(0)
    }

    pub fn iter(self) -> SeqIter<'a> {
        match self {
            Seq::Slice(items) => SeqIter::Slice(items.iter()),
            Seq::Items(items) => SeqIter::Items(items.iter()),
        }
    }
}

pub enum SeqIter<'a> {
    Slice(std::slice::Iter<'a, Value>),
    Items(Iter<'a>),
}

impl<'a> Iterator for SeqIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SeqIter::Slice(inner) => inner.next(),
            SeqIter::Items(inner) => inner.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            SeqIter::Slice(inner) => inner.size_hint(),
            SeqIter::Items(inner) => inner.size_hint(),
        }
    }
}

impl ExactSizeIterator for SeqIter<'_> {}

/// String-keyed association map
#[derive(Clone, Default, PartialEq)]
pub struct Map(im_rc::HashMap<String, Value>);

impl Map {
    pub fn new() -> Self {
        Map::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn put(&self, key: impl Into<String>, value: Value) -> Map {
        Map(self.0.update(key.into(), value))
    }

    pub fn remove(&self, key: &str) -> Map {
        Map(self.0.without(key))
    }

    /// Entries in key order, so printing and `keys`/`vals` are deterministic
    pub fn sorted_entries(&self) -> Vec<(&String, &Value)> {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn keys(&self) -> Vec<String> {
        self.sorted_entries()
            .into_iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.sorted_entries()
            .into_iter()
            .map(|(_, value)| value.clone())
            .collect()
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.sorted_entries()).finish()
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.sorted_entries().into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {value}", Value::String(key.clone()))?;
        }
        write!(f, "}}")
    }
}

/// Set of values, keyed by each member's printed form
#[derive(Clone, Default, PartialEq)]
pub struct Set(Map);

impl Set {
    pub fn new() -> Self {
        Set::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.0.contains_key(&value.to_string())
    }

    pub fn add(&self, value: Value) -> Set {
        Set(self.0.put(value.to_string(), value))
    }

    pub fn remove(&self, value: &Value) -> Set {
        Set(self.0.remove(&value.to_string()))
    }

    pub fn members(&self) -> Vec<Value> {
        self.0.values()
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.members()).finish()
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{{")?;
        write_spaced(f, self.members().iter())?;
        write!(f, "}}")
    }
}

impl FromIterator<Value> for Set {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        iter.into_iter().fold(Set::new(), |set, value| set.add(value))
    }
}

fn write_spaced<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = &'a Value>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    fn numbers(items: &[i32]) -> Vec<Value> {
        items.iter().map(|&n| val(n)).collect()
    }

    #[test]
    fn test_vector_append_and_update_leave_original_intact() {
        let v = Vector::new(numbers(&[1, 2, 3]));

        let appended = v.append(val(4));
        assert_eq!(v.len(), 3);
        assert_eq!(appended.len(), 4);
        assert_eq!(appended.get(3), Some(&val(4)));

        let updated = v.update(1, val(99)).unwrap();
        assert_eq!(v.get(1), Some(&val(2)));
        assert_eq!(updated.get(1), Some(&val(99)));
        assert_eq!(v.to_string(), "[1 2 3]");
    }

    #[test]
    fn test_older_versions_survive_many_appends() {
        let mut versions = vec![Vector::default()];
        for i in 0..1000 {
            let next = versions.last().unwrap().append(val(i));
            versions.push(next);
        }
        assert_eq!(versions[10].len(), 10);
        assert_eq!(versions[500].get(500), None);
        assert_eq!(versions[1000].get(999), Some(&val(999)));

        let updated = versions[1000].update(0, val("first")).unwrap();
        assert_eq!(versions[1000].get(0), Some(&val(0)));
        assert_eq!(updated.get(0), Some(&val("first")));
    }

    #[test]
    fn test_seq_views() {
        let list = List::new(numbers(&[1, 2, 3]));
        let seq = list.as_seq();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.first(), Some(&val(1)));
        assert_eq!(seq.get(2), Some(&val(3)));
        assert_eq!(seq.iter().len(), 3);

        let args = numbers(&[4, 5]);
        let copied: Vector = Seq::Slice(&args).iter().cloned().collect();
        assert_eq!(copied.to_string(), "[4 5]");

        assert!(Seq::EMPTY.is_empty());
        assert_eq!(Seq::EMPTY.first(), None);
    }

    #[test]
    fn test_vector_update_out_of_bounds() {
        let v = Vector::new(numbers(&[1]));
        assert!(matches!(v.update(5, val(0)), Err(Error::EvalError(_))));
    }

    #[test]
    fn test_list_first_rest_cons() {
        let list = List::new(numbers(&[1, 2, 3]));
        assert_eq!(list.first(), Some(&val(1)));
        assert_eq!(list.rest().to_string(), "(2 3)");
        assert_eq!(list.rest().rest().rest().len(), 0);
        assert_eq!(list.rest().rest().rest().rest().len(), 0);
        assert_eq!(list.cons(val(0)).to_string(), "(0 1 2 3)");
        assert_eq!(list.len(), 3);
        assert_eq!(List::new(numbers(&[2, 3])), list.rest());
    }

    #[test]
    fn test_map_put_does_not_alias() {
        let empty = Map::new();
        let a = empty.put("k", val(1));
        let b = a.put("k", val(2));
        let c = a.put("other", val(3));

        assert!(empty.is_empty());
        assert_eq!(a.get("k"), Some(&val(1)));
        assert_eq!(b.get("k"), Some(&val(2)));
        assert!(!a.contains_key("other"));
        assert_eq!(c.len(), 2);

        let removed = c.remove("k");
        assert!(c.contains_key("k"));
        assert!(!removed.contains_key("k"));
    }

    #[test]
    fn test_map_printing_is_sorted() {
        let map = Map::new().put("b", val(2)).put("a", val("x"));
        assert_eq!(map.to_string(), "{\"a\" \"x\", \"b\" 2}");
        assert_eq!(map.keys(), vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn test_set_keyed_by_printed_form() {
        let set = Set::new().add(val(1)).add(val(1)).add(val("1"));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&val(1)));
        assert!(set.contains(&val("1")));

        let smaller = set.remove(&val(1));
        assert_eq!(set.len(), 2);
        assert_eq!(smaller.len(), 1);
    }
}
