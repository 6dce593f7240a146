use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::{Patch, PatchError, PatchOp, PathSegment};

/// Apply `patches` in order to a copy of `base`.
pub fn apply_patches(base: &Value, patches: &[Patch]) -> Result<Value, PatchError> {
    let mut target = base.clone();
    for patch in patches {
        apply_one(&mut target, patch)?;
    }
    Ok(target)
}

/// Typed convenience: serialize `base`, apply `patches`, deserialize back.
pub fn apply_to<T>(base: &T, patches: &[Patch]) -> Result<T, PatchError>
where
    T: Serialize + DeserializeOwned,
{
    if patches.is_empty() {
        return Ok(serde_json::from_value(serde_json::to_value(base)?)?);
    }
    let value = serde_json::to_value(base)?;
    let patched = apply_patches(&value, patches)?;
    Ok(serde_json::from_value(patched)?)
}

fn apply_one(target: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    let Some((last, parents)) = patch.path.split_last() else {
        // Empty path addresses the whole document.
        return match patch.op {
            PatchOp::Add | PatchOp::Replace => {
                *target = required_value(patch)?;
                Ok(())
            }
            PatchOp::Remove => {
                *target = Value::Null;
                Ok(())
            }
        };
    };

    let mut node = target;
    for segment in parents {
        node = child_mut(node, segment).ok_or_else(|| PatchError::PathNotFound {
            path: patch.path.clone(),
        })?;
    }

    match (node, last) {
        (Value::Object(map), PathSegment::Key(key)) => match patch.op {
            PatchOp::Add | PatchOp::Replace => {
                map.insert(key.clone(), required_value(patch)?);
                Ok(())
            }
            PatchOp::Remove => {
                map.remove(key);
                Ok(())
            }
        },
        (Value::Array(items), PathSegment::Index(index)) => {
            let index = *index;
            match patch.op {
                PatchOp::Add if index <= items.len() => {
                    items.insert(index, required_value(patch)?);
                    Ok(())
                }
                PatchOp::Replace if index < items.len() => {
                    items[index] = required_value(patch)?;
                    Ok(())
                }
                PatchOp::Remove if index < items.len() => {
                    items.remove(index);
                    Ok(())
                }
                _ => Err(PatchError::PathNotFound {
                    path: patch.path.clone(),
                }),
            }
        }
        _ => Err(PatchError::NotAContainer {
            path: patch.path.clone(),
        }),
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match (node, segment) {
        (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key),
        (Value::Array(items), PathSegment::Index(index)) => items.get_mut(*index),
        _ => None,
    }
}

fn required_value(patch: &Patch) -> Result<Value, PatchError> {
    patch.value.clone().ok_or_else(|| PatchError::MissingValue {
        op: patch.op,
        path: patch.path.clone(),
    })
}
