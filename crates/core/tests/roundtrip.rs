use content_store_core::ids::SequentialIds;
use content_store_core::schema::{BlockType, CollectionSchema, FieldNode, ScalarField};
use content_store_core::transform::{flatten, reconstruct};
use content_store_core::{ContentLocales, LocaleScope, ALL_LOCALES};
use proptest::prelude::*;
use proptest::sample::subsequence;
use serde_json::{json, Map, Value};

fn schema() -> CollectionSchema {
    CollectionSchema::new(vec![
        ScalarField::text("title").localized().into(),
        ScalarField::integer("views").into(),
        ScalarField::boolean("featured").into(),
        FieldNode::group(
            "seo",
            vec![
                ScalarField::text("description").localized().into(),
                ScalarField::text("keywords").into(),
            ],
        ),
        FieldNode::array(
            "reviews",
            vec![
                ScalarField::integer("rating").into(),
                ScalarField::text("note").localized().into(),
                FieldNode::array("tags", vec![ScalarField::text("label").into()]),
            ],
        ),
        FieldNode::blocks(
            "content",
            vec![
                BlockType::new(
                    "richTextBlock",
                    vec![
                        ScalarField::rich_text("richText").into(),
                        ScalarField::boolean("constrainedWidth").into(),
                    ],
                ),
                BlockType::new(
                    "photoBlock",
                    vec![
                        ScalarField::text("alt").localized().into(),
                        FieldNode::group("caption", vec![ScalarField::text("text").into()]),
                    ],
                ),
                BlockType::new(
                    "gridBlock",
                    vec![FieldNode::array(
                        "cells",
                        vec![ScalarField::integer("value").into()],
                    )],
                ),
            ],
        ),
    ])
    .unwrap()
}

fn text() -> impl Strategy<Value = Value> {
    "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String)
}

fn int() -> impl Strategy<Value = Value> {
    any::<i32>().prop_map(|n| json!(n))
}

fn localized(locales: Vec<String>) -> impl Strategy<Value = Value> {
    let max = locales.len();
    subsequence(locales, 1..=max)
        .prop_flat_map(|codes| {
            let n = codes.len();
            (Just(codes), prop::collection::vec("[a-z ]{0,8}", n))
        })
        .prop_map(|(codes, texts)| {
            Value::Object(
                codes
                    .into_iter()
                    .zip(texts)
                    .map(|(code, t)| (code, Value::String(t)))
                    .collect(),
            )
        })
}

/// Record from optional entries; `None` means the field is absent.
fn record(entries: Vec<(&str, Option<Value>)>) -> Map<String, Value> {
    entries
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
        .collect()
}

/// Elements with ids `{prefix}{n}`, unique within the list.
fn with_ids(prefix: &str, items: Vec<Map<String, Value>>) -> Value {
    Value::Array(
        items
            .into_iter()
            .enumerate()
            .map(|(i, mut item)| {
                item.insert("id".into(), json!(format!("{prefix}{i}")));
                Value::Object(item)
            })
            .collect(),
    )
}

fn tags() -> impl Strategy<Value = Value> {
    prop::collection::vec(prop::option::of(text()), 0..3).prop_map(|labels| {
        with_ids(
            "t",
            labels
                .into_iter()
                .map(|label| record(vec![("label", label)]))
                .collect(),
        )
    })
}

fn review(locales: Vec<String>) -> impl Strategy<Value = Map<String, Value>> {
    (
        prop::option::of(int()),
        prop::option::of(localized(locales)),
        prop::option::of(tags()),
    )
        .prop_map(|(rating, note, tags)| {
            record(vec![("rating", rating), ("note", note), ("tags", tags)])
        })
}

fn block(locales: Vec<String>) -> impl Strategy<Value = Map<String, Value>> {
    let rich = (prop::option::of(text()), prop::option::of(any::<bool>())).prop_map(
        |(insert, width)| {
            let mut block = record(vec![
                ("richText", insert.map(|t| json!({"ops": [{"insert": t}]}))),
                ("constrainedWidth", width.map(Value::Bool)),
            ]);
            block.insert("blockType".into(), json!("richTextBlock"));
            block
        },
    );
    let photo = (prop::option::of(localized(locales)), prop::option::of(text())).prop_map(
        |(alt, caption)| {
            let caption = Some(Value::Object(record(vec![("text", caption)])));
            let mut block = record(vec![("alt", alt), ("caption", caption)]);
            block.insert("blockType".into(), json!("photoBlock"));
            block
        },
    );
    let grid = prop::option::of(prop::collection::vec(prop::option::of(int()), 0..4)).prop_map(
        |cells| {
            let cells = cells.map(|cells| {
                with_ids(
                    "c",
                    cells
                        .into_iter()
                        .map(|v| record(vec![("value", v)]))
                        .collect(),
                )
            });
            let mut block = record(vec![("cells", cells)]);
            block.insert("blockType".into(), json!("gridBlock"));
            block
        },
    );
    prop_oneof![rich, photo, grid]
}

/// A locale set plus a document that conforms to [`schema`] in the
/// all-locales shape.
fn document() -> impl Strategy<Value = (Vec<String>, Value)> {
    let codes: Vec<String> = ["en", "de", "fr"].iter().map(|c| c.to_string()).collect();
    subsequence(codes, 1..=3).prop_flat_map(|locales| {
        let l = locales.clone();
        let fields = (
            prop::option::of(localized(l.clone())),
            prop::option::of(int()),
            prop::option::of(any::<bool>()),
            prop::option::of(localized(l.clone())),
            prop::option::of(text()),
            any::<bool>(),
            prop::option::of(prop::collection::vec(review(l.clone()), 0..4)),
            prop::option::of(prop::collection::vec(block(l), 0..4)),
        )
            .prop_map(
                |(title, views, featured, description, keywords, has_seo, reviews, content)| {
                    let seo = has_seo.then(|| {
                        Value::Object(record(vec![
                            ("description", description),
                            ("keywords", keywords),
                        ]))
                    });
                    Value::Object(record(vec![
                        ("title", title),
                        ("views", views),
                        ("featured", featured.map(Value::Bool)),
                        ("seo", seo),
                        ("reviews", reviews.map(|r| with_ids("r", r))),
                        ("content", content.map(|b| with_ids("b", b))),
                    ]))
                },
            );
        (Just(locales), fields)
    })
}

fn locales_of(codes: &[String]) -> ContentLocales {
    ContentLocales::new(codes[0].clone(), codes.to_vec())
}

proptest! {
    #[test]
    fn flatten_then_reconstruct_is_identity((codes, doc) in document()) {
        let ids = SequentialIds::new("gen");
        let rows = flatten(&doc, &schema(), &LocaleScope::All, &locales_of(&codes), &ids);
        prop_assert_eq!(reconstruct(&rows, ALL_LOCALES), doc);
    }

    #[test]
    fn row_order_does_not_matter((codes, doc) in document()) {
        let ids = SequentialIds::new("gen");
        let mut rows = flatten(&doc, &schema(), &LocaleScope::All, &locales_of(&codes), &ids);
        rows.reverse();
        prop_assert_eq!(reconstruct(&rows, ALL_LOCALES), doc);
    }

    #[test]
    fn single_locale_view_has_no_locale_maps((codes, doc) in document()) {
        let ids = SequentialIds::new("gen");
        let rows = flatten(&doc, &schema(), &LocaleScope::All, &locales_of(&codes), &ids);
        let view = reconstruct(&rows, &codes[0]);
        if let Some(title) = view.get("title") {
            prop_assert!(title.is_string());
            prop_assert_eq!(Some(title), doc["title"].get(&codes[0]));
        }
        prop_assert_eq!(view.get("views"), doc.get("views"));
    }
}
