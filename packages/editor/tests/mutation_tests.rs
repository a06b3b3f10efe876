//! Transaction tests: every edit goes through `Editor::run`

use quire_editor::{BlankPolicy, Editor, EditorConfig, EditorError};
use quire_model::{Builder, Direction, ModelError, NewSection, Position, Post, Range, Section, SectionId};
use serde_json::json;

fn editor_with(sections: impl FnOnce(&mut Builder) -> Vec<NewSection>) -> Editor {
    let mut builder = Builder::new();
    let sections = sections(&mut builder);
    let post = builder.post(sections).unwrap();
    let mut editor = Editor::from_post(post, builder, EditorConfig::immediate());
    editor.render().unwrap();
    editor
}

fn paragraphs(texts: &[&str]) -> Editor {
    editor_with(|b| {
        texts
            .iter()
            .map(|t| b.paragraph(vec![b.marker(*t, vec![])]))
            .collect()
    })
}

fn texts(post: &Post) -> Vec<String> {
    post.leaf_sections().iter().map(|s| post.section_text(*s)).collect()
}

fn leaf(post: &Post, index: usize) -> SectionId {
    post.leaf_sections()[index]
}

fn markups_per_char(post: &Post, section: SectionId) -> Vec<Vec<String>> {
    let mut out = Vec::new();
    for (_, inline) in post.inlines(section) {
        let tags: Vec<String> = inline.markups().iter().map(|m| m.tag().to_string()).collect();
        for _ in 0..inline.len() {
            out.push(tags.clone());
        }
    }
    out
}

#[test]
fn test_split_section_in_the_middle() {
    let mut editor = paragraphs(&["hihey"]);

    editor
        .run(|tx| {
            let section = leaf(tx.post(), 0);
            let at = Position::new(tx.post(), section, 2)?;
            let next = tx.split_section(at)?;
            tx.set_position(next);
            Ok(())
        })
        .unwrap();

    let post = editor.post();
    assert_eq!(texts(post), vec!["hi", "hey"]);
    let range = editor.range().unwrap();
    assert!(range.is_collapsed());
    assert_eq!(range.head.section, leaf(post, 1));
    assert_eq!(range.head.offset, 0);
    assert_eq!(
        editor.to_markup(),
        r#"<div contenteditable="true"><p>hi</p><p>hey</p></div>"#
    );
}

#[test]
fn test_split_at_head_keeps_original_section() {
    let mut editor = paragraphs(&["abc"]);
    let original = leaf(editor.post(), 0);

    editor
        .run(|tx| {
            let next = tx.split_section(Position::head(tx.post(), original)?)?;
            tx.set_position(next);
            Ok(())
        })
        .unwrap();

    let post = editor.post();
    assert_eq!(texts(post), vec!["", "abc"]);
    assert_eq!(leaf(post, 1), original);
}

#[test]
fn test_delete_range_across_card_rejoins_boundaries() {
    let mut editor = editor_with(|b| {
        vec![
            b.paragraph(vec![b.marker("abc", vec![])]),
            b.card_section("embed", json!({})),
            b.paragraph(vec![b.marker("def", vec![])]),
        ]
    });

    editor
        .run(|tx| {
            let post = tx.post();
            let range = Range::new(
                Position::new(post, leaf(post, 0), 1)?,
                Position::new(post, leaf(post, 2), 1)?,
                None,
            );
            if let Some(position) = tx.delete_range(range)? {
                tx.set_position(position);
            }
            Ok(())
        })
        .unwrap();

    let post = editor.post();
    assert_eq!(post.section_count(), 1);
    assert_eq!(texts(post), vec!["aef"]);
    assert_eq!(editor.range().unwrap().head.offset, 1);
}

#[test]
fn test_delete_rejects_range_with_head_after_tail() {
    let mut editor = paragraphs(&["abc", "def"]);

    let result = editor.run(|tx| {
        let post = tx.post();
        let range = Range::new(
            Position::new(post, leaf(post, 1), 1)?,
            Position::new(post, leaf(post, 0), 1)?,
            None,
        );
        tx.delete_range(range)
    });

    assert!(matches!(
        result,
        Err(EditorError::Model(ModelError::InvertedRange { .. }))
    ));
    assert_eq!(texts(editor.post()), vec!["abc", "def"]);
    assert!(!editor.history().can_undo());
}

#[test]
fn test_toggle_markup_rejects_range_with_head_after_tail() {
    let mut editor = paragraphs(&["abc", "def", "ghi"]);

    let result = editor.run(|tx| {
        let bold = tx.builder().simple_markup("b")?;
        let post = tx.post();
        let range = Range::new(
            Position::new(post, leaf(post, 1), 2)?,
            Position::new(post, leaf(post, 0), 1)?,
            None,
        );
        tx.toggle_markup(&bold, range)
    });

    assert!(result.is_err());
    assert_eq!(editor.to_markup(), r#"<div contenteditable="true"><p>abc</p><p>def</p><p>ghi</p></div>"#);
}

#[test]
fn test_deleting_only_card_leaves_blank_paragraph() {
    let mut editor = editor_with(|b| vec![b.card_section("embed", json!({"src": "x"}))]);

    editor
        .run(|tx| {
            let card = leaf(tx.post(), 0);
            let range = Range::of_section(tx.post(), card)?;
            tx.delete_range(range)?;
            Ok(())
        })
        .unwrap();

    let post = editor.post();
    assert_eq!(post.section_count(), 1);
    let first = post.first_section().unwrap();
    assert!(matches!(post.section(first), Some(Section::Markup(s)) if s.tag == "p"));
    assert!(post.is_section_blank(first));
    assert_eq!(
        editor.to_markup(),
        r#"<div contenteditable="true"><p><br></p></div>"#
    );
}

#[test]
fn test_allow_empty_policy_leaves_post_blank() {
    let mut editor = editor_with(|b| vec![b.card_section("embed", json!({}))]);

    editor
        .run(|tx| {
            tx.set_blank_policy(BlankPolicy::AllowEmpty);
            let range = Range::of_section(tx.post(), leaf(tx.post(), 0))?;
            tx.delete_range(range)?;
            Ok(())
        })
        .unwrap();

    assert!(editor.post().is_blank());
    assert_eq!(editor.range(), None);
}

#[test]
fn test_single_list_item_fragment_merges_into_section() {
    let mut editor = paragraphs(&["abc"]);

    editor
        .run(|tx| {
            let builder = tx.builder();
            let item = builder.marker("123", vec![]);
            let fragment = builder.post(vec![builder.list_section("ul", vec![vec![item]])?])?;
            let head = Position::post_head(tx.post()).unwrap();
            let end = tx.insert_post(head, &fragment)?;
            tx.set_position(end);
            Ok(())
        })
        .unwrap();

    let post = editor.post();
    assert_eq!(post.section_count(), 1);
    assert_eq!(texts(post), vec!["123abc"]);
    assert_eq!(editor.range().unwrap().head.offset, 3);
}

#[test]
fn test_multi_section_fragment_splits_target() {
    let mut editor = paragraphs(&["abcd"]);

    editor
        .run(|tx| {
            let builder = tx.builder();
            let fragment = builder.post(vec![
                builder.paragraph(vec![builder.marker("1", vec![])]),
                builder.card_section("embed", json!({})),
                builder.paragraph(vec![builder.marker("2", vec![])]),
            ])?;
            let at = Position::new(tx.post(), leaf(tx.post(), 0), 2)?;
            let end = tx.insert_post(at, &fragment)?;
            tx.set_position(end);
            Ok(())
        })
        .unwrap();

    let post = editor.post();
    assert_eq!(post.section_count(), 3);
    let sections: Vec<_> = post.sections().collect();
    assert_eq!(post.section_text(sections[0]), "ab1");
    assert!(matches!(post.section(sections[1]), Some(Section::Card(_))));
    assert_eq!(post.section_text(sections[2]), "2cd");
    let range = editor.range().unwrap();
    assert_eq!((range.head.section, range.head.offset), (sections[2], 1));
}

#[test]
fn test_toggle_markup_twice_restores_markups() {
    let mut editor = editor_with(|b| {
        let bold = b.simple_markup("b").unwrap();
        vec![b.paragraph(vec![
            b.marker("a", vec![]),
            b.marker("b", vec![bold]),
            b.marker("c", vec![]),
        ])]
    });
    let section = leaf(editor.post(), 0);
    let before = markups_per_char(editor.post(), section);
    let range = Range::new(
        Position::new(editor.post(), section, 1).unwrap(),
        Position::new(editor.post(), section, 2).unwrap(),
        None,
    );
    editor.set_range(range).unwrap();

    editor.toggle_markup("b").unwrap();
    assert!(markups_per_char(editor.post(), section).iter().all(Vec::is_empty));
    // stripping left three plain markers, which coalesce
    assert_eq!(editor.post().inline_ids(section).len(), 1);
    assert_eq!(editor.to_markup(), r#"<div contenteditable="true"><p>abc</p></div>"#);

    editor.toggle_markup("b").unwrap();
    assert_eq!(markups_per_char(editor.post(), section), before);
    assert_eq!(
        editor.to_markup(),
        r#"<div contenteditable="true"><p>a<b>b</b>c</p></div>"#
    );
}

#[test]
fn test_toggle_markup_on_collapsed_range_is_noop() {
    let mut editor = paragraphs(&["abc"]);
    let at = Position::new(editor.post(), leaf(editor.post(), 0), 1).unwrap();
    editor.set_range(Range::collapsed(at)).unwrap();

    editor.toggle_markup("em").unwrap();

    assert!(!editor.history().can_undo());
    assert_eq!(editor.post().inline_ids(leaf(editor.post(), 0)).len(), 1);
}

#[test]
fn test_partial_markup_coverage_adds_everywhere() {
    let mut editor = editor_with(|b| {
        let em = b.simple_markup("em").unwrap();
        vec![b.paragraph(vec![b.marker("ab", vec![em]), b.marker("cd", vec![])])]
    });
    let section = leaf(editor.post(), 0);
    let range = Range::of_section(editor.post(), section).unwrap();
    editor.set_range(range).unwrap();

    editor.toggle_markup("em").unwrap();

    assert!(markups_per_char(editor.post(), section)
        .iter()
        .all(|tags| tags == &vec!["em".to_string()]));
    assert_eq!(editor.post().inline_ids(section).len(), 1);
}

#[test]
fn test_backspace_at_section_head_joins() {
    let mut editor = paragraphs(&["ab", "cd"]);
    let head = Position::head(editor.post(), leaf(editor.post(), 1)).unwrap();
    editor.set_range(Range::collapsed(head)).unwrap();

    editor.delete_selection().unwrap();

    assert_eq!(texts(editor.post()), vec!["abcd"]);
    assert_eq!(editor.range().unwrap().head.offset, 2);
}

#[test]
fn test_backspace_after_card_replaces_it() {
    let mut editor = editor_with(|b| {
        vec![
            b.paragraph(vec![b.marker("ab", vec![])]),
            b.card_section("embed", json!({})),
        ]
    });
    let card = leaf(editor.post(), 1);

    editor
        .run(|tx| {
            let tail = Position::tail(tx.post(), card)?;
            if let Some(position) = tx.delete_at_position(tail, Direction::Backward)? {
                tx.set_position(position);
            }
            Ok(())
        })
        .unwrap();

    let post = editor.post();
    assert_eq!(post.section_count(), 2);
    assert!(!post.contains_section(card));
    assert!(post.is_section_blank(leaf(post, 1)));
}

#[test]
fn test_forward_delete_removes_one_character() {
    let mut editor = paragraphs(&["abc"]);

    editor
        .run(|tx| {
            let at = Position::new(tx.post(), leaf(tx.post(), 0), 1)?;
            tx.delete_at_position(at, Direction::Forward)?;
            Ok(())
        })
        .unwrap();

    assert_eq!(texts(editor.post()), vec!["ac"]);
}

#[test]
fn test_text_typed_on_card_goes_beside_it() {
    let mut editor = editor_with(|b| vec![b.card_section("embed", json!({}))]);
    let card = leaf(editor.post(), 0);
    editor
        .set_range(Range::collapsed(Position::tail(editor.post(), card).unwrap()))
        .unwrap();

    editor.insert_text("x").unwrap();

    let post = editor.post();
    assert_eq!(post.section_count(), 2);
    assert_eq!(post.first_section(), Some(card));
    assert_eq!(post.section_text(leaf(post, 1)), "x");
}

#[test]
fn test_toggle_section_heading_and_list() {
    let mut editor = paragraphs(&["one", "two"]);
    let range = Range::new(
        Position::head(editor.post(), leaf(editor.post(), 0)).unwrap(),
        Position::tail(editor.post(), leaf(editor.post(), 1)).unwrap(),
        None,
    );
    editor.set_range(range).unwrap();

    editor.toggle_section("h2").unwrap();
    assert_eq!(
        editor.to_markup(),
        r#"<div contenteditable="true"><h2>one</h2><h2>two</h2></div>"#
    );

    editor.toggle_section("ol").unwrap();
    assert_eq!(
        editor.to_markup(),
        r#"<div contenteditable="true"><ol><li>one</li><li>two</li></ol></div>"#
    );

    editor.toggle_section("ol").unwrap();
    assert_eq!(
        editor.to_markup(),
        r#"<div contenteditable="true"><p>one</p><p>two</p></div>"#
    );
}

#[test]
fn test_invalid_section_tag_is_rejected() {
    let mut editor = paragraphs(&["abc"]);
    let range = Range::of_section(editor.post(), leaf(editor.post(), 0)).unwrap();
    editor.set_range(range).unwrap();

    assert!(editor.toggle_section("marquee").is_err());
    assert_eq!(editor.to_markup(), r#"<div contenteditable="true"><p>abc</p></div>"#);
}

#[test]
fn test_enter_on_blank_list_item_leaves_list() {
    let mut editor = editor_with(|b| {
        vec![b
            .list_section("ul", vec![vec![b.marker("a", vec![])], vec![]])
            .unwrap()]
    });
    let blank = leaf(editor.post(), 1);
    editor
        .set_range(Range::collapsed(Position::head(editor.post(), blank).unwrap()))
        .unwrap();

    editor.split_at_cursor().unwrap();

    assert_eq!(
        editor.to_markup(),
        r#"<div contenteditable="true"><ul><li>a</li></ul><p><br></p></div>"#
    );
}

#[test]
fn test_move_section_and_attributes() {
    let mut editor = paragraphs(&["a", "b"]);
    let first = leaf(editor.post(), 0);

    editor
        .run(|tx| {
            tx.move_section_down(first)?;
            tx.set_attribute(first, "data-align", "center")?;
            Ok(())
        })
        .unwrap();

    assert_eq!(texts(editor.post()), vec!["b", "a"]);
    assert_eq!(
        editor.to_markup(),
        r#"<div contenteditable="true"><p>b</p><p data-align="center">a</p></div>"#
    );
}
