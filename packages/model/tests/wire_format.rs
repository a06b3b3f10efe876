use quire_model::{wire, Builder, Post, WireError, WireVersion};
use serde_json::json;
use std::rc::Rc;

fn rich_post(b: &mut Builder) -> anyhow::Result<Post> {
    let bold = b.simple_markup("b")?;
    let em = b.simple_markup("em")?;
    let link = b.markup("a", [("href", "https://example.com")])?;

    Ok(b.post(vec![
        b.markup_section(
            "h2",
            vec![
                b.marker("plain ", vec![]),
                b.marker("bold ", vec![bold.clone()]),
                b.marker("both", vec![bold.clone(), em.clone()]),
                b.marker(" em", vec![em]),
            ],
        )?,
        b.list_section(
            "ul",
            vec![
                vec![b.marker("first", vec![link])],
                vec![b.marker("second", vec![bold])],
            ],
        )?,
        b.card_section("gallery", json!({ "images": 3 })),
        b.image_section("/cover.png"),
        b.paragraph(vec![]),
    ])?)
}

#[test]
fn test_round_trip_every_version_without_atoms() -> anyhow::Result<()> {
    let mut b = Builder::new();
    let post = rich_post(&mut b)?;

    for version in WireVersion::ALL {
        let doc = wire::render(&post, version)?;
        assert_eq!(doc["version"], json!(version.as_str()));
        let back = wire::parse(&doc, &mut b)?;
        assert!(back.same_content(&post), "round trip failed for {version}");
        assert_eq!(back.text(), post.text());
    }
    Ok(())
}

#[test]
fn test_atoms_round_trip_from_0_3_0() -> anyhow::Result<()> {
    let mut b = Builder::new();
    let bold = b.simple_markup("b")?;
    let post = b.post(vec![b.paragraph(vec![
        b.marker("hi ", vec![]),
        b.atom("mention", "@bob", json!({ "id": 7 }), vec![bold]),
        b.marker("!", vec![]),
    ])])?;

    for version in [WireVersion::V0_3_0, WireVersion::V0_3_1, WireVersion::V0_3_2] {
        let back = wire::parse(&wire::render(&post, version)?, &mut b)?;
        assert!(back.same_content(&post));
    }

    let err = wire::render(&post, WireVersion::V0_2_0).unwrap_err();
    assert!(matches!(err, WireError::Unrepresentable { feature: "atoms", .. }));
    Ok(())
}

#[test]
fn test_parsed_markups_are_interned_by_the_builder() -> anyhow::Result<()> {
    let mut b = Builder::new();
    let post = rich_post(&mut b)?;
    let doc = wire::render(&post, WireVersion::latest())?;

    let mut fresh = Builder::new();
    let back = wire::parse(&doc, &mut fresh)?;
    let bold = fresh.simple_markup("b")?;

    let bold_uses: Vec<_> = back
        .markerable_sections()
        .into_iter()
        .flat_map(|s| back.inlines(s).map(|(_, i)| i.markups().to_vec()).collect::<Vec<_>>())
        .flatten()
        .filter(|m| m.tag() == "b")
        .collect();
    assert_eq!(bold_uses.len(), 3);
    assert!(bold_uses.iter().all(|m| Rc::ptr_eq(m, &bold)));
    Ok(())
}

#[test]
fn test_markup_table_is_deduplicated() -> anyhow::Result<()> {
    let mut b = Builder::new();
    let post = rich_post(&mut b)?;
    let doc = wire::render(&post, WireVersion::V0_3_2)?;

    assert_eq!(doc["markups"], json!([["b"], ["em"], ["a", ["href", "https://example.com"]]]));
    assert_eq!(
        doc["sections"][0],
        json!([1, "h2", [
            [0, [], 0, "plain "],
            [0, [0], 0, "bold "],
            [0, [1], 2, "both"],
            [0, [1], 1, " em"]
        ]])
    );
    Ok(())
}

#[test]
fn test_section_attributes_need_0_3_2() -> anyhow::Result<()> {
    let mut b = Builder::new();
    let mut post = b.post(vec![b.paragraph(vec![b.marker("centered", vec![])])])?;
    let s = post.first_section().unwrap();
    post.set_section_attribute(s, "data-md-text-align", Some("center".into()))?;

    let latest = wire::render(&post, WireVersion::V0_3_2)?;
    assert_eq!(latest["sections"][0][3], json!(["data-md-text-align", "center"]));
    let back = wire::parse(&latest, &mut b)?;
    let section = back.section(back.first_section().unwrap()).unwrap();
    assert_eq!(
        section.attributes().and_then(|a| a.get("data-md-text-align")).map(String::as_str),
        Some("center")
    );

    let older = wire::render(&post, WireVersion::V0_3_1)?;
    assert_eq!(older["sections"][0].as_array().map(Vec::len), Some(3));
    Ok(())
}

#[test]
fn test_0_2_0_layout() -> anyhow::Result<()> {
    let mut b = Builder::new();
    let doc = json!({
        "version": "0.2.0",
        "sections": [
            [["b"]],
            [
                [1, "p", [[[], 0, "a "], [[0], 1, "bold"]]],
                [10, "embed", { "url": "x" }],
                [3, "ol", [[[[], 0, "one"]], [[[], 0, "two"]]]]
            ]
        ]
    });
    let post = wire::parse(&doc, &mut b)?;
    assert_eq!(post.text(), "a bold\n\none\ntwo");
    assert_eq!(wire::render(&post, WireVersion::V0_2_0)?, doc);
    Ok(())
}

#[test]
fn test_malformed_documents_fail_fast() {
    let mut b = Builder::new();

    let unknown = json!({ "version": "9.9.9", "sections": [] });
    assert!(matches!(
        wire::parse(&unknown, &mut b),
        Err(WireError::UnsupportedVersion(v)) if v == "9.9.9"
    ));

    let bad_section = json!({ "version": "0.3.2", "markups": [], "sections": [[42, "p", []]] });
    assert!(matches!(
        wire::parse(&bad_section, &mut b),
        Err(WireError::MalformedSection { index: 0, .. })
    ));

    let bad_markup = json!({ "version": "0.3.2", "markups": [], "sections": [[1, "p", [[0, [3], 1, "x"]]]] });
    assert!(matches!(wire::parse(&bad_markup, &mut b), Err(WireError::UnknownMarkup(3))));

    let overclosed = json!({ "version": "0.3.0", "markups": [["b"]], "sections": [[1, "p", [[0, [0], 2, "x"]]]] });
    assert!(matches!(
        wire::parse(&overclosed, &mut b),
        Err(WireError::MalformedMarker { section: 0, marker: 0, .. })
    ));

    let missing_card = json!({ "version": "0.3.1", "cards": [], "sections": [[10, 0]] });
    assert!(matches!(wire::parse(&missing_card, &mut b), Err(WireError::UnknownCard(0))));

    assert!(matches!(wire::from_str("{not json", &mut b), Err(WireError::Json(_))));
}
