//! Helpers that keep a sequence's position field dense after a reorder.

/// Items carrying a 1-based position within their containing list.
pub trait Ordered {
  fn ordering(&self) -> u32;
  fn set_ordering(&mut self, ordering: u32);
}

/// Move the element at `from` to `to` within the same vector.
///
/// Both indices must be in bounds; this panics otherwise.
pub fn move_in_place<T>(items: &mut Vec<T>, from: usize, to: usize) {
  if from == to {
    return;
  }
  let item = items.remove(from);
  items.insert(to, item);
}

/// Set every element's ordering to its position + 1.
pub fn renumber<T: Ordered>(items: &mut [T]) {
  for (position, item) in items.iter_mut().enumerate() {
    item.set_ordering(position as u32 + 1);
  }
}

/// Zero-based landing index for a drop at 1-based `position` within the
/// same list the item is leaving from `from`.
///
/// Dropping below the current slot lands one earlier, since the item's
/// own slot disappears when it is removed. The result is clamped to the
/// last valid index.
pub fn drop_index(from: usize, position: u32, len: usize) -> usize {
  let mut to = (position as usize).saturating_sub(1);
  if from < to {
    to -= 1;
  }
  to.min(len.saturating_sub(1))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, PartialEq)]
  struct Item {
    name: &'static str,
    ordering: u32,
  }

  impl Ordered for Item {
    fn ordering(&self) -> u32 {
      self.ordering
    }

    fn set_ordering(&mut self, ordering: u32) {
      self.ordering = ordering;
    }
  }

  fn items(names: &[&'static str]) -> Vec<Item> {
    let mut items: Vec<Item> = names
      .iter()
      .map(|name| Item {
        name: *name,
        ordering: 0,
      })
      .collect();
    renumber(&mut items);
    items
  }

  fn names(items: &[Item]) -> Vec<&'static str> {
    items.iter().map(|i| i.name).collect()
  }

  #[test]
  fn test_renumber_is_dense_and_one_based() {
    let mut list = vec![
      Item { name: "a", ordering: 7 },
      Item { name: "b", ordering: 3 },
      Item { name: "c", ordering: 3 },
    ];
    renumber(&mut list);
    for (i, item) in list.iter().enumerate() {
      assert_eq!(item.ordering(), i as u32 + 1);
    }

    let before = list.clone();
    renumber(&mut list);
    assert_eq!(list, before);
  }

  #[test]
  fn test_move_up() {
    let mut list = items(&["t1", "t2", "t3"]);
    move_in_place(&mut list, 2, 0);
    renumber(&mut list);
    assert_eq!(names(&list), vec!["t3", "t1", "t2"]);
    assert_eq!(list[0].ordering, 1);
    assert_eq!(list[2].ordering, 3);
  }

  #[test]
  fn test_move_to_same_index_is_noop() {
    let mut list = items(&["t1", "t2", "t3"]);
    let before = list.clone();
    move_in_place(&mut list, 1, 1);
    renumber(&mut list);
    assert_eq!(list, before);
  }

  #[test]
  fn test_drop_index_upward_uses_position_minus_one() {
    assert_eq!(drop_index(2, 1, 3), 0);
  }

  #[test]
  fn test_drop_index_downward_accounts_for_removed_slot() {
    // t1 dropped before position 3 lands between t2 and t3
    assert_eq!(drop_index(0, 3, 3), 1);
    let mut list = items(&["t1", "t2", "t3"]);
    move_in_place(&mut list, 0, drop_index(0, 3, 3));
    assert_eq!(names(&list), vec!["t2", "t1", "t3"]);
  }

  #[test]
  fn test_drop_index_own_position() {
    for from in 0..3 {
      assert_eq!(drop_index(from, from as u32 + 1, 3), from);
    }
  }

  #[test]
  fn test_drop_index_clamps_past_end() {
    assert_eq!(drop_index(0, 10, 3), 2);
    assert_eq!(drop_index(0, 0, 3), 0);
  }

  #[test]
  fn test_orderings_stay_dense_across_move_sequences() {
    let mut list = items(&["a", "b", "c", "d", "e"]);
    let len = list.len();
    // every (from, position) pair in turn, each applied to the list the
    // previous step left behind, including positions past the end
    for from in 0..len {
      for position in 0..=len as u32 + 1 {
        let to = drop_index(from, position, len);
        move_in_place(&mut list, from, to);
        renumber(&mut list);

        for (i, item) in list.iter().enumerate() {
          assert_eq!(item.ordering(), i as u32 + 1, "after moving {} to {}", from, position);
        }
        let mut sorted = names(&list);
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d", "e"]);
      }
    }
  }
}
