use serde_json::{Map, Value};

use super::{Patch, PatchError, PathSegment, MAX_PATCH_DEPTH};

// ============================================================================
// Public API
// ============================================================================

/// Compute the ordered patch list that turns `old_value` into `new_value`.
///
/// Objects are diffed key by key (removed keys first, then changed and added
/// keys in `new_value` order). Arrays are diffed index-wise over the common
/// prefix; extra elements are added at the tail or removed from the highest
/// index down. Anything else is compared with `==` and replaced wholesale.
///
/// Returns an empty list when the values are equal.
pub fn diff(old_value: &Value, new_value: &Value) -> Result<Vec<Patch>, PatchError> {
    let mut patches = Vec::new();
    let mut path = Vec::new();
    diff_node(old_value, new_value, &mut path, &mut patches, 0)?;
    Ok(patches)
}

// ============================================================================
// Core diff logic
// ============================================================================

fn diff_node(
    old_val: &Value,
    new_val: &Value,
    path: &mut Vec<PathSegment>,
    patches: &mut Vec<Patch>,
    depth: usize,
) -> Result<(), PatchError> {
    if depth > MAX_PATCH_DEPTH {
        return Err(PatchError::DepthExceeded);
    }

    match (old_val, new_val) {
        (Value::Object(old_obj), Value::Object(new_obj)) => {
            diff_objects(old_obj, new_obj, path, patches, depth)
        }
        (Value::Array(old_arr), Value::Array(new_arr)) => {
            diff_arrays(old_arr, new_arr, path, patches, depth)
        }
        _ => {
            if old_val != new_val {
                patches.push(Patch::replace(path.clone(), new_val.clone()));
            }
            Ok(())
        }
    }
}

fn diff_objects(
    old_obj: &Map<String, Value>,
    new_obj: &Map<String, Value>,
    path: &mut Vec<PathSegment>,
    patches: &mut Vec<Patch>,
    depth: usize,
) -> Result<(), PatchError> {
    for key in old_obj.keys() {
        if !new_obj.contains_key(key) {
            path.push(PathSegment::Key(key.clone()));
            patches.push(Patch::remove(path.clone()));
            path.pop();
        }
    }

    for (key, new_child) in new_obj {
        path.push(PathSegment::Key(key.clone()));
        match old_obj.get(key) {
            Some(old_child) => diff_node(old_child, new_child, path, patches, depth + 1)?,
            None => patches.push(Patch::add(path.clone(), new_child.clone())),
        }
        path.pop();
    }
    Ok(())
}

fn diff_arrays(
    old_arr: &[Value],
    new_arr: &[Value],
    path: &mut Vec<PathSegment>,
    patches: &mut Vec<Patch>,
    depth: usize,
) -> Result<(), PatchError> {
    let common = old_arr.len().min(new_arr.len());
    for i in 0..common {
        path.push(PathSegment::Index(i));
        diff_node(&old_arr[i], &new_arr[i], path, patches, depth + 1)?;
        path.pop();
    }

    for (i, item) in new_arr.iter().enumerate().skip(common) {
        path.push(PathSegment::Index(i));
        patches.push(Patch::add(path.clone(), item.clone()));
        path.pop();
    }

    // Highest index first so earlier indices stay valid while applying.
    for i in (common..old_arr.len()).rev() {
        path.push(PathSegment::Index(i));
        patches.push(Patch::remove(path.clone()));
        path.pop();
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
