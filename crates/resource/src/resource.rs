use crate::error::{Error, ErrorKind};
use crate::geo::TileId;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// URL prefix of resources shipped inside the application bundle.
pub const ASSET_SCHEME: &str = "asset://";

/// Number of codepoints covered by a single glyph range request.
const GLYPH_RANGE_SIZE: u32 = 256;

/// What a [`Resource`] is, used for routing and for storage bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Style,
    Tile,
    /// A TileJSON source document.
    Source,
    /// A sprite sheet, either its JSON index or its image.
    Sprite,
    /// A range of glyphs for one font stack.
    Glyph,
    #[default]
    Unknown,
}
impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Style => "style",
            ResourceKind::Tile => "tile",
            ResourceKind::Source => "source",
            ResourceKind::Sprite => "sprite",
            ResourceKind::Glyph => "glyph",
            ResourceKind::Unknown => "unknown",
        }
    }
}
impl FromStr for ResourceKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "style" => Self::Style,
            "tile" => Self::Tile,
            "source" => Self::Source,
            "sprite" => Self::Sprite,
            "glyph" | "glyphs" => Self::Glyph,
            "unknown" => Self::Unknown,
            _ => exn::bail!(ErrorKind::ParseError {
                field: "resource kind",
                value: s.to_string(),
            }),
        })
    }
}
impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// URL scheme families the resolver routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `asset://`, served from the local bundle.
    Asset,
    /// `http://` or `https://`.
    Http,
    /// Anything else (`mapbox://`, `file://`...), left for the network
    /// fetcher to interpret.
    Other,
}

/// An addressable item requested from a file source.
///
/// Immutable once constructed: the URL and kind are only exposed through
/// accessors.
///
/// # Examples
///
/// ```
/// use cartage_resource::{Resource, ResourceKind, Scheme, TileId};
///
/// let tile = Resource::tile("https://tiles.example.com/{z}/{x}/{y}{ratio}.png", TileId::new(3, 1, 2), 2.0);
/// assert_eq!(tile.url(), "https://tiles.example.com/3/1/2@2x.png");
/// assert_eq!(tile.kind(), ResourceKind::Tile);
/// assert_eq!(Resource::from_url("asset://styles/bright.json").scheme(), Scheme::Asset);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    url: String,
    kind: ResourceKind,
}
impl Resource {
    pub fn new(kind: ResourceKind, url: impl Into<String>) -> Self {
        Self { url: url.into(), kind }
    }

    /// Create a resource, classifying its kind from the shape of the URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let kind = classify(&url);
        Self { url, kind }
    }

    pub fn style(url: impl Into<String>) -> Self {
        Self::new(ResourceKind::Style, url)
    }

    pub fn source(url: impl Into<String>) -> Self {
        Self::new(ResourceKind::Source, url)
    }

    /// The JSON index of a sprite sheet, `{base}[@2x].json`.
    pub fn sprite_json(base: &str, pixel_ratio: f32) -> Self {
        Self::new(ResourceKind::Sprite, sprite_url(base, pixel_ratio, ".json"))
    }

    /// The image of a sprite sheet, `{base}[@2x].png`.
    pub fn sprite_image(base: &str, pixel_ratio: f32) -> Self {
        Self::new(ResourceKind::Sprite, sprite_url(base, pixel_ratio, ".png"))
    }

    /// One glyph range for a font stack, expanding `{fontstack}` and
    /// `{range}` in the template. `start` is rounded down to the beginning
    /// of its 256-codepoint range.
    pub fn glyphs(template: &str, fontstack: &str, start: u32) -> Self {
        let start = start - start % GLYPH_RANGE_SIZE;
        let range = format!("{}-{}", start, start + GLYPH_RANGE_SIZE - 1);
        let url = template.replace("{fontstack}", fontstack).replace("{range}", &range);
        Self::new(ResourceKind::Glyph, url)
    }

    /// A tile, expanding `{z}`, `{x}`, `{y}` and `{ratio}` in the template.
    pub fn tile(template: &str, tile: TileId, pixel_ratio: f32) -> Self {
        let url = template
            .replace("{z}", &tile.z.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
            .replace("{ratio}", ratio_suffix(pixel_ratio));
        Self::new(ResourceKind::Tile, url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn scheme(&self) -> Scheme {
        if self.url.starts_with(ASSET_SCHEME) {
            Scheme::Asset
        } else if self.url.starts_with("https://") || self.url.starts_with("http://") {
            Scheme::Http
        } else {
            Scheme::Other
        }
    }

    pub fn is_asset(&self) -> bool {
        self.scheme() == Scheme::Asset
    }

    /// The bundle-relative path of an `asset://` resource, without any query
    /// string or fragment. `None` for every other scheme.
    pub fn asset_path(&self) -> Option<&str> {
        self.url.strip_prefix(ASSET_SCHEME).map(strip_query)
    }
}
impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} ({})", self.url, self.kind)
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

fn ratio_suffix(pixel_ratio: f32) -> &'static str {
    if pixel_ratio > 1.0 { "@2x" } else { "" }
}

fn sprite_url(base: &str, pixel_ratio: f32, extension: &str) -> String {
    // Suffixes go before the query string (hosted sprites carry tokens).
    match base.split_once('?') {
        Some((path, query)) => format!("{path}{}{extension}?{query}", ratio_suffix(pixel_ratio)),
        None => format!("{base}{}{extension}", ratio_suffix(pixel_ratio)),
    }
}

fn is_number(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// `2`, `2.pbf`, `2@2x.png`...
fn is_tile_row(segment: &str) -> bool {
    let digits = segment.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && matches!(segment.as_bytes().get(digits), None | Some(b'.') | Some(b'@'))
}

/// `0-255.pbf`
fn is_glyph_range(segment: &str) -> bool {
    segment
        .strip_suffix(".pbf")
        .and_then(|stem| stem.split_once('-'))
        .is_some_and(|(start, end)| is_number(start) && is_number(end))
}

fn classify(url: &str) -> ResourceKind {
    let path = strip_query(url);
    let segments: Vec<&str> = path.rsplit('/').take(3).collect();
    let file = segments.first().copied().unwrap_or_default();
    if is_glyph_range(file) {
        return ResourceKind::Glyph;
    }
    if let [row, column, zoom] = segments.as_slice()
        && is_tile_row(row)
        && is_number(column)
        && is_number(zoom)
    {
        return ResourceKind::Tile;
    }
    if file.starts_with("sprite") && (file.ends_with(".json") || file.ends_with(".png")) {
        return ResourceKind::Sprite;
    }
    if file.ends_with(".json") {
        return match file.contains("style") {
            true => ResourceKind::Style,
            false => ResourceKind::Source,
        };
    }
    ResourceKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://tiles.example.com/3/1/2.pbf", ResourceKind::Tile)]
    #[case("https://tiles.example.com/v4/14/8185/5448@2x.png?access_token=abc", ResourceKind::Tile)]
    #[case("https://fonts.example.com/Open Sans Regular/0-255.pbf", ResourceKind::Glyph)]
    #[case("https://example.com/sprites/sprite@2x.json", ResourceKind::Sprite)]
    #[case("https://example.com/sprites/sprite.png", ResourceKind::Sprite)]
    #[case("asset://styles/bright-style.json", ResourceKind::Style)]
    #[case("https://example.com/tilejson/streets.json", ResourceKind::Source)]
    #[case("https://example.com/readme.txt", ResourceKind::Unknown)]
    #[case("https://example.com/a/b/c.pbf", ResourceKind::Unknown)]
    fn test_classify(#[case] url: &str, #[case] expected: ResourceKind) {
        assert_eq!(Resource::from_url(url).kind(), expected);
    }

    #[rstest]
    #[case("asset://styles/bright.json", Scheme::Asset)]
    #[case("https://example.com/style.json", Scheme::Http)]
    #[case("http://example.com/style.json", Scheme::Http)]
    #[case("mapbox://styles/mapbox/streets-v8", Scheme::Other)]
    #[case("assets://typo.json", Scheme::Other)]
    fn test_scheme(#[case] url: &str, #[case] expected: Scheme) {
        assert_eq!(Resource::from_url(url).scheme(), expected);
    }

    #[test]
    fn test_asset_path_strips_scheme_and_query() {
        let resource = Resource::from_url("asset://styles/bright.json?v=2#top");
        assert_eq!(resource.asset_path(), Some("styles/bright.json"));
        assert_eq!(Resource::from_url("https://example.com/x.json").asset_path(), None);
    }

    #[test]
    fn test_sprite_suffix_goes_before_query() {
        let sprite = Resource::sprite_image("https://example.com/sprite?access_token=t", 2.0);
        assert_eq!(sprite.url(), "https://example.com/sprite@2x.png?access_token=t");
        let sprite = Resource::sprite_json("https://example.com/sprite", 1.0);
        assert_eq!(sprite.url(), "https://example.com/sprite.json");
    }

    #[rstest]
    #[case(0, "0-255")]
    #[case(255, "0-255")]
    #[case(256, "256-511")]
    #[case(65280, "65280-65535")]
    fn test_glyph_ranges(#[case] start: u32, #[case] range: &str) {
        let glyphs = Resource::glyphs("https://fonts.example.com/{fontstack}/{range}.pbf", "Noto Sans", start);
        assert_eq!(glyphs.url(), format!("https://fonts.example.com/Noto Sans/{range}.pbf"));
        assert_eq!(glyphs.kind(), ResourceKind::Glyph);
    }

    #[test]
    fn test_tile_template_expansion() {
        let tile = Resource::tile("https://t.example.com/{z}/{x}/{y}{ratio}.png", TileId::new(3, 1, 2), 1.0);
        assert_eq!(tile.url(), "https://t.example.com/3/1/2.png");
        assert_eq!(Resource::from_url(tile.url()).kind(), ResourceKind::Tile);
    }

    #[rstest]
    #[case(ResourceKind::Style)]
    #[case(ResourceKind::Tile)]
    #[case(ResourceKind::Source)]
    #[case(ResourceKind::Sprite)]
    #[case(ResourceKind::Glyph)]
    #[case(ResourceKind::Unknown)]
    fn test_kind_name_parses_back(#[case] kind: ResourceKind) {
        assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
    }

    #[test]
    fn test_kind_parse_error() {
        let err = "texture".parse::<ResourceKind>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::ParseError { field: "resource kind", .. }));
    }
}
