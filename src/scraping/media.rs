//! Media extraction and image scoring.

use kuchiki::NodeRef;
use url::Url;

use crate::config::CrawlerRunConfig;
use crate::models::{Media, MediaItem};
use crate::utils::word_count;

/// `src` resolution order for `<img>`: lazy-loading attributes shadow the
/// real source on many sites.
const SRC_ATTRIBUTES: &[&str] = &["src", "data-src", "srcset", "data-original", "data-lazy-src"];

/// Below this many pixels on either axis an image is never content.
const MIN_IMAGE_DIMENSION: u32 = 50;

/// Dimension above which an axis counts toward the content score.
const SCORED_IMAGE_DIMENSION: u32 = 150;

/// Substrings in class names or URLs that mark non-content imagery.
const NON_CONTENT_PATTERNS: &[&str] = &[
    "icon", "thumbnail", "thumb", "placeholder", "sprite", "avatar", "badge", "pixel", "tracking",
];

/// Length cap for descriptions lifted from surrounding text.
const DESCRIPTION_MAX_CHARS: usize = 180;

/// Walk the scoped tree and build the media inventory.
pub fn extract_media(
    root: &NodeRef,
    base_url: Option<&Url>,
    config: &CrawlerRunConfig,
) -> Media {
    let mut media = Media::default();
    for node in root.descendants() {
        let Some(element) = node.as_element() else {
            continue;
        };
        match element.name.local.as_ref() {
            "img" => {
                if let Some(item) = score_image(&node, element, base_url, config) {
                    media.images.push(item);
                }
            }
            "video" => {
                if let Some(item) = plain_media(element, base_url) {
                    media.videos.push(item);
                }
            }
            "audio" => {
                if let Some(item) = plain_media(element, base_url) {
                    media.audio.push(item);
                }
            }
            _ => {}
        }
    }
    media
}

/// Apply the drop rules and scoring of one `<img>`.
fn score_image(
    node: &NodeRef,
    element: &kuchiki::ElementData,
    base_url: Option<&Url>,
    config: &CrawlerRunConfig,
) -> Option<MediaItem> {
    let attrs = element.attributes.borrow();

    let raw_src = SRC_ATTRIBUTES.iter().find_map(|name| {
        let value = attrs.get(*name)?;
        if value.is_empty() {
            return None;
        }
        // srcset: first candidate, URL part only.
        if *name == "srcset" {
            return value.split(',').next()?.split_whitespace().next().map(String::from);
        }
        Some(value.to_string())
    })?;

    let url = resolve(&raw_src, base_url)?;

    let width = attrs.get("width").and_then(|v| v.parse::<u32>().ok());
    let height = attrs.get("height").and_then(|v| v.parse::<u32>().ok());
    let alt = attrs.get("alt").map(str::to_string).filter(|a| !a.is_empty());
    let class = attrs.get("class").unwrap_or_default().to_lowercase();

    // Drop rules, cheapest first.
    if width == Some(0) || height == Some(0) {
        return None;
    }
    if width.is_some_and(|w| w < MIN_IMAGE_DIMENSION)
        || height.is_some_and(|h| h < MIN_IMAGE_DIMENSION)
    {
        return None;
    }
    let haystack = format!("{class} {}", url.to_lowercase());
    if NON_CONTENT_PATTERNS.iter().any(|p| haystack.contains(p)) {
        return None;
    }
    if config.exclude_external_images
        && let Some(base) = base_url
        && Url::parse(&url).ok().is_some_and(|u| !crate::utils::same_host(&u, base))
    {
        return None;
    }

    let description = surrounding_description(node, config.image_description_min_word_threshold);

    let mut score = 0;
    if width.is_some_and(|w| w >= SCORED_IMAGE_DIMENSION) {
        score += 1;
    }
    if height.is_some_and(|h| h >= SCORED_IMAGE_DIMENSION) {
        score += 1;
    }
    if alt.is_some() {
        score += 1;
    }
    if description.is_some() {
        score += 1;
    }
    if [".jpg", ".jpeg", ".png", ".webp"].iter().any(|ext| url.to_lowercase().contains(ext)) {
        score += 1;
    }

    if score < config.image_score_threshold {
        return None;
    }

    Some(MediaItem {
        url,
        score,
        description,
        alt,
        width,
        height,
    })
}

/// A description is only lifted when the image sits in a text-dense spot.
fn surrounding_description(node: &NodeRef, min_words: usize) -> Option<String> {
    let parent = node.parent()?;
    let text = parent.text_contents();
    let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if word_count(&trimmed) < min_words.max(1) {
        return None;
    }
    let description: String = trimmed.chars().take(DESCRIPTION_MAX_CHARS).collect();
    Some(description)
}

fn plain_media(element: &kuchiki::ElementData, base_url: Option<&Url>) -> Option<MediaItem> {
    let attrs = element.attributes.borrow();
    let src = attrs.get("src").filter(|s| !s.is_empty())?;
    let url = resolve(src, base_url)?;
    Some(MediaItem {
        url,
        ..MediaItem::default()
    })
}

fn resolve(src: &str, base_url: Option<&Url>) -> Option<String> {
    if src.starts_with("data:") {
        return None;
    }
    match base_url {
        Some(base) => crate::url_ref::fast_join(base, src),
        None => Some(src.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;

    fn extract(html: &str, config: &CrawlerRunConfig) -> Media {
        let doc = kuchiki::parse_html().one(html.to_string());
        let base = Url::parse("https://example.com/").expect("test url");
        extract_media(&doc, Some(&base), config)
    }

    #[test]
    fn large_png_with_alt_is_kept_and_tiny_dropped() {
        let media = extract(
            r#"<body>
                <img src="big.png" width="300" height="300" alt="chart">
                <img src="dot.png" width="10" height="10" alt="dot">
            </body>"#,
            &CrawlerRunConfig::default(),
        );
        assert_eq!(media.images.len(), 1);
        let img = &media.images[0];
        assert_eq!(img.url, "https://example.com/big.png");
        assert!(img.score >= 3);
        assert_eq!(img.width, Some(300));
    }

    #[test]
    fn lazy_src_attributes_are_consulted_in_order() {
        let media = extract(
            r#"<body><img data-src="lazy.png" width="400" height="400" alt="x"></body>"#,
            &CrawlerRunConfig::default(),
        );
        assert_eq!(media.images.len(), 1);
        assert_eq!(media.images[0].url, "https://example.com/lazy.png");
    }

    #[test]
    fn srcset_takes_the_first_candidate() {
        let media = extract(
            r#"<body><img srcset="one.png 1x, two.png 2x" width="400" height="400" alt="x"></body>"#,
            &CrawlerRunConfig::default(),
        );
        assert_eq!(media.images[0].url, "https://example.com/one.png");
    }

    #[test]
    fn icon_pattern_in_class_or_url_drops_image() {
        let media = extract(
            r#"<body>
                <img src="favicon-icon.png" width="300" height="300" alt="x">
                <img class="thumbnail" src="a.png" width="300" height="300" alt="x">
            </body>"#,
            &CrawlerRunConfig::default(),
        );
        assert!(media.images.is_empty());
    }

    #[test]
    fn external_images_drop_when_excluded() {
        let config = CrawlerRunConfig::builder()
            .exclude_external_images(true)
            .build()
            .expect("config");
        let media = extract(
            r#"<body><img src="https://cdn.other.test/big.png" width="300" height="300" alt="x"></body>"#,
            &config,
        );
        assert!(media.images.is_empty());
    }

    #[test]
    fn description_requires_dense_surrounding_text() {
        let config = CrawlerRunConfig::builder()
            .image_description_min_word_threshold(5)
            .image_score_threshold(4)
            .build()
            .expect("config");
        let media = extract(
            r#"<body><figure>
                Here is a long enough caption describing the image in detail.
                <img src="big.png" width="300" height="300" alt="x">
            </figure></body>"#,
            &config,
        );
        assert_eq!(media.images.len(), 1);
        assert!(media.images[0].description.as_deref().is_some_and(|d| d.contains("caption")));
    }

    #[test]
    fn videos_and_audio_are_inventoried() {
        let media = extract(
            r#"<body><video src="/v.mp4"></video><audio src="/a.mp3"></audio></body>"#,
            &CrawlerRunConfig::default(),
        );
        assert_eq!(media.videos.len(), 1);
        assert_eq!(media.audio.len(), 1);
        assert_eq!(media.videos[0].url, "https://example.com/v.mp4");
    }
}
