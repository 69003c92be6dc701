//! Ordered stacks of primitive layers
//!
//! A recipe lists layers in *decode* order: `recipe[0]` is peeled first.
//! The composite does not guess orderings; the state machine enumerates them.

use tagx_core::{KeyMaterial, LayerDescriptor};

use crate::layer::{codec_for, LayerCodec, LayerError};

pub struct Composite {
    layers: Vec<(Box<dyn LayerCodec>, KeyMaterial)>,
}

impl Composite {
    pub fn new(layers: Vec<(Box<dyn LayerCodec>, KeyMaterial)>) -> Result<Self, LayerError> {
        if layers.len() < 2 {
            return Err(LayerError::TooFewLayers(layers.len()));
        }
        Ok(Self { layers })
    }

    pub fn from_recipe(recipe: &[LayerDescriptor]) -> Result<Self, LayerError> {
        let layers = recipe
            .iter()
            .map(|d| Ok((codec_for(d.method)?, d.key.clone())))
            .collect::<Result<Vec<_>, LayerError>>()?;
        Self::new(layers)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Peel layers in recipe order.
    pub fn decode(&self, buf: &[u8]) -> Result<Vec<u8>, LayerError> {
        let mut current = buf.to_vec();
        for (codec, key) in &self.layers {
            current = codec.decode(&current, key.as_bytes())?;
        }
        Ok(current)
    }

    /// Apply inverses in reverse recipe order.
    pub fn encode(&self, buf: &[u8]) -> Result<Vec<u8>, LayerError> {
        let mut current = buf.to_vec();
        for (codec, key) in self.layers.iter().rev() {
            current = codec.encode(&current, key.as_bytes())?;
        }
        Ok(current)
    }
}

/// Decode with a one-layer primitive or a composite, depending on recipe length.
pub fn decode_recipe(recipe: &[LayerDescriptor], buf: &[u8]) -> Result<Vec<u8>, LayerError> {
    match recipe {
        [] => Err(LayerError::EmptyRecipe),
        [single] => codec_for(single.method)?.decode(buf, single.key.as_bytes()),
        _ => Composite::from_recipe(recipe)?.decode(buf),
    }
}

pub fn encode_recipe(recipe: &[LayerDescriptor], buf: &[u8]) -> Result<Vec<u8>, LayerError> {
    match recipe {
        [] => Err(LayerError::EmptyRecipe),
        [single] => codec_for(single.method)?.encode(buf, single.key.as_bytes()),
        _ => Composite::from_recipe(recipe)?.encode(buf),
    }
}
