//! Dictionary merge with configurable depth.

use super::{Dictionary, Variant};
use crate::error::{Error, Result};
use bitflags::bitflags;

bitflags! {
    /// Merge behaviour flags. The empty set is a shallow merge.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MergeMode: u32 {
        /// Fail with TypeError when dst and src values have different kinds
        const CHECK_TYPE = 1 << 0;
        /// Merge dictionaries found under the same key recursively
        const MERGE_NESTED_DICT = 1 << 1;
        /// Append sequences found under the same key
        const MERGE_NESTED_SEQ = 1 << 2;
        /// Only add keys missing from dst
        const NEW_KEYS_ONLY = 1 << 3;
        /// Store null src values instead of erasing the dst key
        const NON_ERASING_NULLS = 1 << 4;
        const ALL = Self::MERGE_NESTED_DICT.bits() | Self::MERGE_NESTED_SEQ.bits();
    }
}

/// Merge `src` over `dst`.
///
/// A null side yields the other side. Two dictionaries are merged key by key
/// with `src` winning; a null value in `src` erases the key from the result
/// unless [`MergeMode::NON_ERASING_NULLS`] is set. Any other pair returns `src` (or TypeError under
/// [`MergeMode::CHECK_TYPE`] when the kinds differ).
pub fn merge(dst: &Variant, src: &Variant, mode: MergeMode) -> Result<Variant> {
    let (dst, src) = (dst.resolve(), src.resolve());
    if src.is_null() {
        return Ok(dst.clone());
    }
    if dst.is_null() {
        return Ok(src.clone());
    }

    match (dst, src) {
        (Variant::Dictionary(d), Variant::Dictionary(s)) => Ok(merge_dict(d, s, mode)?.into()),
        (Variant::Sequence(d), Variant::Sequence(s)) if mode.contains(MergeMode::MERGE_NESTED_SEQ) => {
            let mut merged = d.clone();
            merged.extend(s.clone());
            Ok(merged.into())
        }
        _ if mode.contains(MergeMode::CHECK_TYPE) && dst.value_type() != src.value_type() => {
            Err(Error::type_error(format!(
                "can't merge <{}> into <{}>",
                src.value_type(),
                dst.value_type()
            )))
        }
        _ => Ok(src.clone()),
    }
}

fn merge_dict(dst: &Dictionary, src: &Dictionary, mode: MergeMode) -> Result<Dictionary> {
    let mut result = dst.clone();
    for (key, value) in src.iter() {
        if value.resolve().is_null() && !mode.contains(MergeMode::NON_ERASING_NULLS) {
            result.erase(key);
            continue;
        }
        let merged = match result.get(key) {
            None => value.clone(),
            Some(_) if mode.contains(MergeMode::NEW_KEYS_ONLY) => continue,
            Some(existing) => {
                let nested = existing.is_dictionary() && value.is_dictionary();
                let nested_seq = existing.is_sequence() && value.is_sequence();
                if (nested && mode.contains(MergeMode::MERGE_NESTED_DICT))
                    || (nested_seq && mode.contains(MergeMode::MERGE_NESTED_SEQ))
                {
                    merge(existing, value, mode)?
                } else if nested || value.resolve().is_null() {
                    value.clone()
                } else {
                    merge(existing, value, mode & MergeMode::CHECK_TYPE)?
                }
            }
        };
        result.put(key, merged);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dict, seq};

    #[test]
    fn test_shallow_merge_src_wins() {
        let dst = dict! { "a" => 1, "b" => 2 };
        let src = dict! { "b" => 20, "c" => 30 };
        let merged = merge(&dst, &src, MergeMode::empty()).unwrap();
        assert_eq!(merged, dict! { "a" => 1, "b" => 20, "c" => 30 });
    }

    #[test]
    fn test_null_sides() {
        let d = dict! { "a" => 1 };
        assert_eq!(merge(&Variant::Null, &d, MergeMode::empty()).unwrap(), d);
        assert_eq!(merge(&d, &Variant::Null, MergeMode::empty()).unwrap(), d);
    }

    #[test]
    fn test_null_value_erases_key() {
        let dst = dict! { "a" => 1, "b" => 1 };
        let src = dict! { "b" => Variant::Null, "c" => Variant::Null };
        assert_eq!(merge(&dst, &src, MergeMode::empty()).unwrap(), dict! { "a" => 1 });
        assert_eq!(merge(&dst, &src, MergeMode::CHECK_TYPE).unwrap(), dict! { "a" => 1 });

        let kept = merge(&dst, &src, MergeMode::NON_ERASING_NULLS).unwrap();
        assert_eq!(kept, dict! { "a" => 1, "b" => Variant::Null, "c" => Variant::Null });
    }

    #[test]
    fn test_nested_null_erases_inner_key() {
        let dst = dict! { "n" => dict! { "x" => 1, "y" => 2 } };
        let src = dict! { "n" => dict! { "y" => Variant::Null } };
        let merged = merge(&dst, &src, MergeMode::MERGE_NESTED_DICT).unwrap();
        assert_eq!(merged, dict! { "n" => dict! { "x" => 1 } });
    }

    #[test]
    fn test_non_dictionary_replaces() {
        let merged = merge(&dict! { "a" => 1 }, &Variant::from(5), MergeMode::empty()).unwrap();
        assert_eq!(merged, Variant::from(5));
    }

    #[test]
    fn test_nested_dictionaries() {
        let dst = dict! { "n" => dict! { "x" => 1, "y" => 2 } };
        let src = dict! { "n" => dict! { "y" => 3 } };

        let shallow = merge(&dst, &src, MergeMode::empty()).unwrap();
        assert_eq!(shallow, dict! { "n" => dict! { "y" => 3 } });

        let deep = merge(&dst, &src, MergeMode::MERGE_NESTED_DICT).unwrap();
        assert_eq!(deep, dict! { "n" => dict! { "x" => 1, "y" => 3 } });
    }

    #[test]
    fn test_nested_sequences_append() {
        let dst = dict! { "s" => seq![1, 2] };
        let src = dict! { "s" => seq![3] };
        let merged = merge(&dst, &src, MergeMode::ALL).unwrap();
        assert_eq!(merged, dict! { "s" => seq![1, 2, 3] });
    }

    #[test]
    fn test_check_type() {
        let dst = dict! { "a" => 1 };
        let src = dict! { "a" => "one" };
        let err = merge(&dst, &src, MergeMode::CHECK_TYPE).unwrap_err();
        assert!(matches!(err, Error::TypeError(_)));
    }

    #[test]
    fn test_new_keys_only() {
        let merged = merge(
            &dict! { "a" => 1 },
            &dict! { "a" => 2, "b" => 3 },
            MergeMode::NEW_KEYS_ONLY,
        )
        .unwrap();
        assert_eq!(merged, dict! { "a" => 1, "b" => 3 });
    }

    #[test]
    fn test_mode_masks() {
        let mode = MergeMode::MERGE_NESTED_DICT | MergeMode::CHECK_TYPE;
        assert!(mode.contains(MergeMode::CHECK_TYPE));
        assert!(!mode.contains(MergeMode::ALL));
        assert!(mode.intersects(MergeMode::ALL));
    }
}
