//! Keyed list mapping
//!
//! Maps a reactive list onto per-item rows. A row is created once per key,
//! lives in its own scope and is reused while its key stays in the list, so
//! reordering items never rebuilds them.

use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use crate::reactive::{create_memo, untrack, Memo};
use crate::scope::{create_scope, Scope};

struct Row<U> {
    value: U,
    scope: Scope,
}

/// Map `source` into rows keyed by `key_fn`
///
/// `map_fn` runs once per new key inside a fresh child scope; rows whose key
/// disappears have their scope disposed. Duplicate keys after the first are
/// skipped with a warning.
pub fn map_keyed<T, K, U, S, KF, MF>(source: S, key_fn: KF, map_fn: MF) -> Memo<Vec<U>>
where
    T: 'static,
    K: Eq + Hash + Clone + std::fmt::Debug + 'static,
    U: Clone + PartialEq + 'static,
    S: Fn() -> Vec<T> + 'static,
    KF: Fn(&T) -> K + 'static,
    MF: Fn(T) -> U + 'static,
{
    let ((), holder) = create_scope(|| ());
    let rows: Rc<RefCell<FxHashMap<K, Row<U>>>> = Rc::new(RefCell::new(FxHashMap::default()));

    create_memo(move || {
        let items = source();
        untrack(|| {
            let mut next: FxHashMap<K, Row<U>> = FxHashMap::default();
            let mut out = Vec::with_capacity(items.len());

            for item in items {
                let key = key_fn(&item);
                if next.contains_key(&key) {
                    tracing::warn!(?key, "duplicate key in keyed list, skipping item");
                    continue;
                }
                let existing = rows.borrow_mut().remove(&key);
                let row = match existing {
                    Some(row) => row,
                    None => {
                        let (value, scope) = holder.create_child(|| map_fn(item));
                        Row { value, scope }
                    }
                };
                out.push(row.value.clone());
                next.insert(key, row);
            }

            let stale = std::mem::replace(&mut *rows.borrow_mut(), next);
            for (_, row) in stale {
                row.scope.dispose();
            }
            out
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{create_signal, on_cleanup};
    use crate::scope::create_root;
    use std::cell::Cell;

    #[test]
    fn test_rows_reused_across_reorder() {
        let created = Rc::new(Cell::new(0));
        let disposed = Rc::new(Cell::new(0));
        let ((items, mapped), _root) = create_root(|| {
            let items = create_signal(vec![1, 2, 3]);
            let created = created.clone();
            let disposed = disposed.clone();
            let mapped = map_keyed(
                move || items.get(),
                |n| *n,
                move |n| {
                    created.set(created.get() + 1);
                    let disposed = disposed.clone();
                    on_cleanup(move || disposed.set(disposed.get() + 1));
                    n * 10
                },
            );
            (items, mapped)
        });

        assert_eq!(mapped.get(), vec![10, 20, 30]);
        items.set(vec![3, 2, 1]);
        assert_eq!(mapped.get(), vec![30, 20, 10]);
        assert_eq!(created.get(), 3);
        assert_eq!(disposed.get(), 0);

        items.set(vec![2, 4]);
        assert_eq!(mapped.get(), vec![20, 40]);
        assert_eq!(created.get(), 4);
        assert_eq!(disposed.get(), 2);
    }

    #[test]
    fn test_duplicate_keys_skipped() {
        let (mapped, _root) = create_root(|| map_keyed(|| vec![1, 1, 2], |n| *n, |n| n));
        assert_eq!(mapped.get(), vec![1, 2]);
    }
}
