use greeting_cards_rust::placement::{MAX_FONT_SIZE, MIN_FONT_SIZE};
use greeting_cards_rust::{Bounds, NameList, PlacementEditor, parse_names};
use proptest::prelude::*;

proptest! {
    #[test]
    fn drag_keeps_anchor_in_unit_square(
        moves in prop::collection::vec((-5_000.0f64..5_000.0, -5_000.0f64..5_000.0), 1..40),
        left in -200.0f64..200.0,
        top in -200.0f64..200.0,
        width in 1.0f64..2_000.0,
        height in 1.0f64..2_000.0
    ) {
        let bounds = Bounds::new(left, top, width, height);
        let mut editor = PlacementEditor::default();
        editor.begin_drag();
        for (x, y) in moves {
            editor.update_from_pointer(x, y, bounds);
            let config = editor.config();
            prop_assert!((0.0..=1.0).contains(&config.anchor_x()));
            prop_assert!((0.0..=1.0).contains(&config.anchor_y()));
        }
        editor.end_drag();
        prop_assert!(!editor.is_dragging());
    }

    #[test]
    fn font_size_always_within_slider_range(size in any::<i64>()) {
        let mut editor = PlacementEditor::default();
        let stored = editor.set_font_size(size).font_size();
        prop_assert!((MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&stored));
        if (20..=120).contains(&size) {
            prop_assert_eq!(i64::from(stored), size);
        }
    }

    #[test]
    fn parsed_names_are_trimmed_and_non_blank(
        lines in prop::collection::vec("[ \t]{0,3}[A-Za-z]{0,6}[ \t]{0,3}", 0..30)
    ) {
        let lf = lines.join("\n");
        let crlf = lines.join("\r\n");
        let parsed = parse_names(&lf);

        let expected = lines.iter().filter(|line| !line.trim().is_empty()).count();
        prop_assert_eq!(parsed.len(), expected);
        prop_assert_eq!(&parsed, &parse_names(&crlf));
        for name in &parsed {
            prop_assert!(!name.is_empty());
            prop_assert_eq!(name.trim(), name.as_str());
        }

        let mut list = NameList::new();
        prop_assert_eq!(list.append_text(&crlf), expected);
    }
}
