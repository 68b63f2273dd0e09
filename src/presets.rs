//! Built-in carousel page and its four cards.

use crate::autofit::AutofitParams;
use crate::config::{CardConfig, ConfigError, CropConfig, DefaultCopy, OutputSize};
use crate::element::Element;
use crate::selector::SelectorChain;

/// Page markup shared by the built-in cards.
pub const TEMPLATE_JSON: &str = include_str!("../templates/carousel.json");

pub const PLACEHOLDER_IMAGE: &str = "https://cdn.prod.website-files.com/678517a28eb2d34a4320905a/6785414deac53aed0c68c0b9_Placeholder%20IMG.png";

pub fn template() -> Result<Element, ConfigError> {
    Ok(serde_json::from_str(TEMPLATE_JSON)?)
}

fn chain(groups: &[&str]) -> Result<SelectorChain, ConfigError> {
    Ok(SelectorChain::parse(groups)?)
}

fn fit(max_lines: u32) -> AutofitParams {
    AutofitParams {
        max_lines,
        ..Default::default()
    }
}

fn copy(heading: &str, content: &str, content2: &str) -> DefaultCopy {
    DefaultCopy {
        heading: heading.to_string(),
        content: content.to_string(),
        content2: content2.to_string(),
    }
}

pub fn cards() -> Result<Vec<CardConfig>, ConfigError> {
    let preview = Some(chain(&[".preview_block"])?);

    Ok(vec![
        CardConfig {
            id: "card-1".into(),
            label: "Cover".into(),
            root: chain(&["#id-card"])?,
            preview_container: preview.clone(),
            heading_targets: chain(&[".design-heading"])?,
            content_targets: chain(&[".design-content"])?,
            content2_targets: chain(&[".design-content-2"])?,
            image_targets: chain(&[".id-card-mugshot"])?,
            crop: CropConfig {
                aspect_ratio: Some(1.0),
                output: None,
                view_mode: 2,
            },
            heading_fit: fit(3),
            defaults: copy(
                "Seun Lanlege raised $5.6M for his project.",
                "But 9 years ago, he was a dropout chasing an unconventional path to  success.",
                "Here’s how his conviction pushed him to build the 3rd biggest bridge on Polkadot.",
            ),
            placeholder_image: None,
        },
        CardConfig {
            id: "card-2".into(),
            label: "Body".into(),
            root: chain(&["#id-card-2"])?,
            preview_container: preview.clone(),
            heading_targets: chain(&[".carousel-4-body-header_wrapper"])?,
            content_targets: chain(&[".design-content-body"])?,
            content2_targets: chain(&[".design-content-body-2"])?,
            image_targets: chain(&[".id-card-mugshot-body"])?,
            crop: CropConfig {
                aspect_ratio: Some(591.0 / 273.0),
                output: Some(OutputSize {
                    width: 591,
                    height: 273,
                }),
                view_mode: 2,
            },
            heading_fit: fit(3),
            defaults: copy(
                "In 2016, Seun dropped out of university.",
                "It was an unconventional move, but he believed that focusing on programming was a better option.",
                "And then in 2017, he stumbled upon bitcoin.",
            ),
            placeholder_image: Some(PLACEHOLDER_IMAGE.into()),
        },
        CardConfig {
            id: "card-3".into(),
            label: "Page 3".into(),
            root: chain(&["#id-card-3"])?,
            preview_container: preview.clone(),
            heading_targets: chain(&[
                ".page3-design-heading",
                ".carousel-4-page3-header_wrapper",
                ".carousel-4-body-header_wrapper",
            ])?,
            content_targets: chain(&[".page3-design-content", ".design-content-body"])?,
            content2_targets: chain(&[".page3-design-content-2", ".design-content-body-2"])?,
            image_targets: chain(&[
                ".page3-design-image",
                ".id-card-mugshot-body",
                ".id-card-mugshot",
            ])?,
            crop: CropConfig {
                aspect_ratio: Some(1.0),
                output: Some(OutputSize {
                    width: 342,
                    height: 342,
                }),
                view_mode: 2,
            },
            heading_fit: fit(2),
            defaults: copy(
                "The crypto jihadist.",
                "Initially, he thought it was a scam. But the more he read about it, the more he became convinced about it’s potentials.",
                "And so, he learned Rust and started contributing to Ethereum’s open source libraries.",
            ),
            placeholder_image: Some(PLACEHOLDER_IMAGE.into()),
        },
        CardConfig {
            id: "card-4".into(),
            label: "Page 4".into(),
            root: chain(&["#id-card-4"])?,
            preview_container: preview,
            heading_targets: chain(&[
                ".page4-design-heading",
                ".carousel-4-page4-header_wrapper",
                ".carousel-4-body-header_wrapper",
            ])?,
            content_targets: chain(&[".page4-design-content", ".design-content-body"])?,
            content2_targets: chain(&[".page4-design-content-2", ".design-content-body-2"])?,
            image_targets: chain(&[
                ".page4-design-image",
                ".id-card-mugshot-body",
                ".id-card-mugshot",
            ])?,
            crop: CropConfig {
                aspect_ratio: Some(1.0),
                output: Some(OutputSize {
                    width: 342,
                    height: 342,
                }),
                view_mode: 2,
            },
            heading_fit: fit(3),
            defaults: copy(
                "Working with Ethereum’s co-founder.",
                "In 2018, Parity Ethereum was hiring and he applied.\nHis contributions were noticed and he got invited for an interview.",
                "He impressed the Parity team, and so he got hired.",
            ),
            placeholder_image: Some(PLACEHOLDER_IMAGE.into()),
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn test_every_card_resolves_in_template() {
        let doc = Document::from_element(&template().unwrap(), 1440.0);
        for card in cards().unwrap() {
            let root = card
                .root
                .resolve_first(&doc, doc.root())
                .unwrap_or_else(|| panic!("{} has no root", card.id));
            for (name, chain) in [
                ("heading", &card.heading_targets),
                ("content", &card.content_targets),
                ("content2", &card.content2_targets),
                ("image", &card.image_targets),
            ] {
                assert!(
                    !chain.resolve(&doc, root).is_empty(),
                    "{} {name} resolves to nothing",
                    card.id
                );
            }
        }
    }

    #[test]
    fn test_card_four_uses_fallback_groups() {
        let doc = Document::from_element(&template().unwrap(), 1440.0);
        let card = cards().unwrap().remove(3);
        let root = card.root.resolve_first(&doc, doc.root()).unwrap();
        assert_eq!(card.heading_targets.resolve_with_group(&doc, root).unwrap().0, 1);
        assert_eq!(card.content_targets.resolve_with_group(&doc, root).unwrap().0, 1);
        assert_eq!(card.image_targets.resolve_with_group(&doc, root).unwrap().0, 1);
    }

    #[test]
    fn test_line_budgets() {
        let budgets: Vec<u32> = cards()
            .unwrap()
            .iter()
            .map(|c| c.heading_fit.max_lines)
            .collect();
        assert_eq!(budgets, vec![3, 3, 2, 3]);
    }
}
