//! The parts of style and TileJSON documents a download session needs.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Zoom range assumed when a source does not declare one.
const DEFAULT_MIN_ZOOM: f64 = 0.0;
const DEFAULT_MAX_ZOOM: f64 = 22.0;
/// Font stack symbol layers fall back to when they set no `text-font`.
const DEFAULT_FONTSTACK: &str = "Open Sans Regular,Arial Unicode MS Regular";
const TILED_SOURCE_TYPES: [&str; 3] = ["vector", "raster", "raster-dem"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StyleManifest {
    pub sources: BTreeMap<String, SourceManifest>,
    /// A base URL, or an array of `{ "id", "url" }` objects.
    sprite: Option<Value>,
    pub glyphs: Option<String>,
    layers: Vec<LayerManifest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SourceManifest {
    #[serde(rename = "type")]
    kind: String,
    /// A TileJSON document describing the source.
    pub url: Option<String>,
    #[serde(flatten)]
    pub tileset: TileJson,
}

/// A TileJSON document, or the same fields inlined in a style source.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct TileJson {
    tiles: Vec<String>,
    minzoom: Option<f64>,
    maxzoom: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LayerManifest {
    #[serde(rename = "type")]
    kind: String,
    layout: Map<String, Value>,
}

/// Tile URL template and zoom range of one source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tileset {
    pub template: String,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl StyleManifest {
    pub fn parse(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// Sources made of tiles, in name order. GeoJSON, image and video sources
    /// are self-contained and skipped.
    pub fn tiled_sources(&self) -> impl Iterator<Item = (&str, &SourceManifest)> {
        self.sources
            .iter()
            .filter(|(_, source)| TILED_SOURCE_TYPES.contains(&source.kind.as_str()))
            .map(|(name, source)| (name.as_str(), source))
    }

    /// Base URLs of every sprite sheet.
    pub fn sprite_bases(&self) -> Vec<String> {
        match &self.sprite {
            Some(Value::String(base)) => vec![base.clone()],
            Some(Value::Array(sprites)) => sprites
                .iter()
                .filter_map(|sprite| sprite.get("url").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Every font stack a symbol layer names, comma-joined the way glyph
    /// URLs expect.
    pub fn fontstacks(&self) -> BTreeSet<String> {
        let mut fontstacks = BTreeSet::new();
        for layer in self.layers.iter().filter(|layer| layer.kind == "symbol") {
            match layer.layout.get("text-font") {
                Some(font) => collect_fontstacks(font, &mut fontstacks),
                None if layer.layout.contains_key("text-field") => {
                    fontstacks.insert(DEFAULT_FONTSTACK.to_string());
                },
                None => {},
            }
        }
        fontstacks
    }
}

/// Font stacks are usually literal arrays of names, but may be wrapped in
/// `["literal", [...]]` or hidden inside other expressions (`step`, `match`),
/// in which case every literal array found is taken.
fn collect_fontstacks(value: &Value, fontstacks: &mut BTreeSet<String>) {
    let Value::Array(items) = value else {
        return;
    };
    let names: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
    match names {
        Some(names) if !names.is_empty() && !is_operator(names[0]) => {
            fontstacks.insert(names.join(","));
        },
        _ => items.iter().for_each(|item| collect_fontstacks(item, fontstacks)),
    }
}

fn is_operator(name: &str) -> bool {
    matches!(name, "literal" | "get" | "step" | "match" | "case" | "coalesce" | "zoom" | "interpolate")
}

impl TileJson {
    pub fn parse(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// `None` when the document lists no tile URLs.
    pub fn tileset(&self) -> Option<Tileset> {
        Some(Tileset {
            template: self.tiles.first()?.clone(),
            min_zoom: self.minzoom.unwrap_or(DEFAULT_MIN_ZOOM),
            max_zoom: self.maxzoom.unwrap_or(DEFAULT_MAX_ZOOM),
        })
    }
}
