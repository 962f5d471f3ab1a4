//! Collection-shaped requests.

use std::sync::Arc;

use crate::{Instance, Result};

/// Shape a collection parameter asks for.
///
/// Abstract shapes map onto the three runtime shapes: read-only sequences,
/// iterables and collections become [`Collection::Tuple`], mutable sequences
/// become [`Collection::List`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CollectionShape {
    #[default]
    List,
    Set,
    Tuple,
    Sequence,
    Iterable,
    Collection,
    MutableSequence,
}

impl CollectionShape {
    /// The concrete shape produced for this request.
    pub fn runtime(self) -> CollectionShape {
        match self {
            Self::List | Self::MutableSequence => Self::List,
            Self::Set => Self::Set,
            Self::Tuple | Self::Sequence | Self::Iterable | Self::Collection => Self::Tuple,
        }
    }
}

/// Resolved members of a collection request, most recent registration first.
#[derive(Debug)]
pub enum Collection<T: ?Sized> {
    List(Vec<Arc<T>>),
    /// Distinct instances only, by identity
    Set(Vec<Arc<T>>),
    Tuple(Arc<[Arc<T>]>),
}

impl<T: ?Sized + Send + Sync + 'static> Collection<T> {
    pub(crate) fn from_instances(shape: CollectionShape, instances: &[Instance]) -> Result<Self> {
        let shape = shape.runtime();
        let mut seen: Vec<&Instance> = Vec::with_capacity(instances.len());
        let mut items = Vec::with_capacity(instances.len());
        for instance in instances {
            if shape == CollectionShape::Set {
                if seen.iter().any(|s| s.same_as(instance)) {
                    continue;
                }
                seen.push(instance);
            }
            items.push(instance.require::<T>()?);
        }
        Ok(match shape {
            CollectionShape::Set => Self::Set(items),
            CollectionShape::Tuple => Self::Tuple(items.into()),
            _ => Self::List(items),
        })
    }
}

impl<T: ?Sized> Collection<T> {
    pub fn shape(&self) -> CollectionShape {
        match self {
            Self::List(_) => CollectionShape::List,
            Self::Set(_) => CollectionShape::Set,
            Self::Tuple(_) => CollectionShape::Tuple,
        }
    }

    pub fn as_slice(&self) -> &[Arc<T>] {
        match self {
            Self::List(items) | Self::Set(items) => items.as_slice(),
            Self::Tuple(items) => &items[..],
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<T>> {
        self.as_slice().iter()
    }

    pub fn into_vec(self) -> Vec<Arc<T>> {
        match self {
            Self::List(items) | Self::Set(items) => items,
            Self::Tuple(items) => items.to_vec(),
        }
    }
}

impl<T: ?Sized> Clone for Collection<T> {
    fn clone(&self) -> Self {
        match self {
            Self::List(items) => Self::List(items.clone()),
            Self::Set(items) => Self::Set(items.clone()),
            Self::Tuple(items) => Self::Tuple(Arc::clone(items)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mapping() {
        assert_eq!(CollectionShape::Sequence.runtime(), CollectionShape::Tuple);
        assert_eq!(CollectionShape::Iterable.runtime(), CollectionShape::Tuple);
        assert_eq!(CollectionShape::Collection.runtime(), CollectionShape::Tuple);
        assert_eq!(CollectionShape::MutableSequence.runtime(), CollectionShape::List);
        assert_eq!(CollectionShape::Set.runtime(), CollectionShape::Set);
    }

    #[test]
    fn test_set_drops_repeated_instances() {
        let one = Instance::new(1u32);
        let two = Instance::new(2u32);
        let instances = vec![one.clone(), two, one];

        let set = Collection::<u32>::from_instances(CollectionShape::Set, &instances).unwrap();
        assert_eq!(set.len(), 2);

        let tuple = Collection::<u32>::from_instances(CollectionShape::Sequence, &instances).unwrap();
        assert_eq!(tuple.shape(), CollectionShape::Tuple);
        let values: Vec<u32> = tuple.iter().map(|v| **v).collect();
        assert_eq!(values, vec![1, 2, 1]);
    }
}
