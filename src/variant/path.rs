//! Access into nested containers by path: `"key1.key2[10].key3[0]"`.
//!
//! The empty path addresses the root itself.

use super::Variant;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse(path: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => part.split_at(pos),
            None => (part, ""),
        };
        if key.is_empty() && (rest.is_empty() || !segments.is_empty()) && !path.is_empty() {
            return Err(Error::invalid_argument(format!("invalid path <{path}>: empty key")));
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        }
        while !rest.is_empty() {
            let close = rest
                .find(']')
                .ok_or_else(|| Error::invalid_argument(format!("invalid path <{path}>: unclosed index")))?;
            let index = rest[1..close]
                .parse::<usize>()
                .map_err(|_| Error::invalid_argument(format!("invalid path <{path}>: bad index <{}>", &rest[1..close])))?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(Error::invalid_argument(format!("invalid path <{path}>")));
            }
        }
    }
    Ok(segments)
}

fn step<'v>(node: &'v Variant, segment: &Segment<'_>, path: &str) -> Result<&'v Variant> {
    match (node.resolve(), segment) {
        (Variant::Dictionary(d), Segment::Key(key)) => d
            .get(key)
            .ok_or_else(|| Error::OutOfRange(format!("path <{path}>: key <{key}> not found"))),
        (Variant::Sequence(s), Segment::Index(i)) => s
            .get(*i)
            .ok_or_else(|| Error::OutOfRange(format!("path <{path}>: index {i} is out of range"))),
        (other, _) => Err(Error::type_error(format!(
            "path <{path}>: can't step into <{}>",
            other.value_type()
        ))),
    }
}

/// Element at `path`. `OutOfRange` when missing, `TypeError` when the path
/// crosses a non-container.
pub fn get_by_path<'v>(root: &'v Variant, path: &str) -> Result<&'v Variant> {
    parse(path)?
        .iter()
        .try_fold(root.resolve(), |node, segment| step(node, segment, path))
}

pub fn get_by_path_safe<'v>(root: &'v Variant, path: &str) -> Option<&'v Variant> {
    get_by_path(root, path).ok()
}

/// Store `value` at `path`.
///
/// With `create_paths` missing dictionary levels (and a null root) are
/// created. Sequence indexes must already exist.
pub fn put_by_path(root: &mut Variant, path: &str, value: Variant, create_paths: bool) -> Result<()> {
    let segments = parse(path)?;
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut node = root;
    for segment in parents {
        node = step_mut(node, segment, path, create_paths)?;
    }
    if node.is_null() && create_paths {
        *node = Variant::Dictionary(Default::default());
    }
    match (last, node.as_dict_mut().is_some()) {
        (Segment::Key(key), true) => {
            if let Some(d) = node.as_dict_mut() {
                d.put(*key, value);
            }
            Ok(())
        }
        (Segment::Index(i), false) => {
            let Some(s) = node.as_seq_mut() else {
                return Err(Error::type_error(format!("path <{path}>: index {i} applied to a non-sequence")));
            };
            let slot = s
                .get_mut(*i)
                .ok_or_else(|| Error::OutOfRange(format!("path <{path}>: index {i} is out of range")))?;
            *slot = value;
            Ok(())
        }
        _ => Err(Error::type_error(format!(
            "path <{path}>: can't store into <{}>",
            node.value_type()
        ))),
    }
}

fn step_mut<'v>(node: &'v mut Variant, segment: &Segment<'_>, path: &str, create: bool) -> Result<&'v mut Variant> {
    if node.is_null() && create {
        *node = Variant::Dictionary(Default::default());
    }
    let kind = node.value_type();
    match segment {
        Segment::Key(key) => {
            let d = node
                .as_dict_mut()
                .ok_or_else(|| Error::type_error(format!("path <{path}>: can't step into <{kind}>")))?;
            if !d.has(key) {
                if !create {
                    return Err(Error::OutOfRange(format!("path <{path}>: key <{key}> not found")));
                }
                d.put(*key, Variant::Null);
            }
            d.get_mut(key)
                .ok_or_else(|| Error::OutOfRange(format!("path <{path}>: key <{key}> not found")))
        }
        Segment::Index(i) => node
            .as_seq_mut()
            .ok_or_else(|| Error::type_error(format!("path <{path}>: can't step into <{kind}>")))?
            .get_mut(*i)
            .ok_or_else(|| Error::OutOfRange(format!("path <{path}>: index {i} is out of range"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dict, seq};

    #[test]
    fn test_get_nested() {
        let v = dict! { "a" => dict! { "list" => seq![10, dict! { "x" => "deep" }] } };
        assert_eq!(get_by_path(&v, "a.list[0]").unwrap(), &Variant::from(10));
        assert_eq!(get_by_path(&v, "a.list[1].x").unwrap(), &Variant::from("deep"));
        assert_eq!(get_by_path(&v, "").unwrap(), &v);

        assert!(matches!(get_by_path(&v, "a.missing"), Err(Error::OutOfRange(_))));
        assert!(matches!(get_by_path(&v, "a.list[5]"), Err(Error::OutOfRange(_))));
        assert!(matches!(get_by_path(&v, "a.list[0].x"), Err(Error::TypeError(_))));
        assert!(matches!(get_by_path(&v, "a..b"), Err(Error::InvalidArgument(_))));
        assert!(get_by_path_safe(&v, "a.list[1]").is_some());
    }

    #[test]
    fn test_put_creates_levels() {
        let mut v = Variant::Null;
        put_by_path(&mut v, "a.b.c", Variant::from(1), true).unwrap();
        assert_eq!(v, dict! { "a" => dict! { "b" => dict! { "c" => 1 } } });

        put_by_path(&mut v, "a.b.d", Variant::from(2), false).unwrap();
        assert_eq!(get_by_path(&v, "a.b.d").unwrap(), &Variant::from(2));
        assert!(matches!(
            put_by_path(&mut v, "x.y", Variant::from(3), false),
            Err(Error::OutOfRange(_))
        ));
    }

    #[test]
    fn test_put_into_sequence() {
        let mut v = dict! { "s" => seq![1, 2] };
        put_by_path(&mut v, "s[1]", Variant::from(20), false).unwrap();
        assert_eq!(v, dict! { "s" => seq![1, 20] });
        assert!(matches!(
            put_by_path(&mut v, "s[2]", Variant::from(3), true),
            Err(Error::OutOfRange(_))
        ));
    }
}
