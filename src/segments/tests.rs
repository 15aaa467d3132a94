use super::*;
use crate::annotation::Flag;

fn display_text(segment: &Segment) -> Option<String> {
    match segment {
        Segment::Display(display) => Some(
            display
                .nodes
                .iter()
                .map(|node| node.plain_text())
                .collect::<Vec<_>>()
                .join(" "),
        ),
        _ => None,
    }
}

#[test]
fn annotation_before_fence_merges_into_code() {
    let list = build("This is a test\n\n[](nospin)\n\n```ruby\nSomecode\n```\n");
    let segments = list.segments();
    assert_eq!(segments.len(), 2);
    assert_eq!(display_text(&segments[0]).as_deref(), Some("This is a test"));
    match &segments[1] {
        Segment::Code(code) => {
            assert_eq!(code.language.as_deref(), Some("ruby"));
            assert_eq!(code.source, "Somecode\n");
            assert_eq!(code.annotations.flags().collect::<Vec<_>>(), vec!["nospin"]);
            assert_eq!(code.annotations.params().count(), 0);
            assert_eq!(code.line, 6);
        }
        other => panic!("expected code segment, got {other:?}"),
    }
}

#[test]
fn invisible_block_splices_its_own_display_segment() {
    let list = build("Normal\n\n<!--~\nHidden\n-->\nMore");
    let texts: Vec<String> = list.segments().iter().filter_map(display_text).collect();
    assert_eq!(texts, vec!["Normal", "Hidden", "More"]);
    assert_eq!(list.len(), 3);
}

#[test]
fn invisible_block_can_hold_code() {
    let list = build("<!--~\n```bash\necho hidden\n```\n-->\n");
    assert!(matches!(list.segments(), [Segment::Code(code)] if code.source == "echo hidden\n"));
}

#[test]
fn fence_info_and_preceding_blocks_merge_right_biased() {
    let list = build("<r with=zsh spinner=one/>\n\n```bash with=bash reveal\necho\n```\n");
    match list.segments() {
        [Segment::Code(code)] => {
            assert_eq!(code.annotations.param(crate::annotation::Param::With), Some("bash"));
            assert_eq!(
                code.annotations.param(crate::annotation::Param::Spinner),
                Some("one")
            );
            assert!(code.annotations.has(Flag::Reveal));
        }
        other => panic!("unexpected segments {other:?}"),
    }
}

#[test]
fn separators_follow_code_before_prose_and_headings() {
    let list = build("Intro\n\n```bash\necho 1\n```\n\nAfter\n\n```bash\necho 2\n```\n\n# Next\n");
    let shape: Vec<&str> = list
        .segments()
        .iter()
        .map(|segment| match segment {
            Segment::Display(_) => "display",
            Segment::Code(_) => "code",
            Segment::Heading(_) => "heading",
            Segment::Setup(_) => "setup",
            Segment::Separator => "separator",
        })
        .collect();
    assert_eq!(
        shape,
        vec!["display", "code", "separator", "display", "code", "separator", "heading"]
    );
}

#[test]
fn levels_follow_most_recent_heading() {
    let list = build("Top\n\n```bash\necho 0\n```\n\n# One\n\nText\n\n## Two\n\n```bash\necho 2\n```\n\n# Back\n\nTail\n");
    let levels: Vec<(bool, u8)> = list
        .segments()
        .iter()
        .filter(|segment| matches!(segment, Segment::Display(_) | Segment::Code(_)))
        .map(|segment| (segment.is_code(), segment.level().unwrap_or_default()))
        .collect();
    assert_eq!(
        levels,
        vec![(false, 0), (true, 0), (false, 1), (true, 2), (false, 1)]
    );
}

#[test]
fn heading_parents_have_strictly_lower_levels() {
    let list = build("# A\n\n## B\n\n### C\n\n## D\n\n# E\n");
    let headings: Vec<(usize, &HeadingMarker)> = list
        .segments()
        .iter()
        .enumerate()
        .filter_map(|(idx, segment)| match segment {
            Segment::Heading(h) => Some((idx, h)),
            _ => None,
        })
        .collect();
    let parents: Vec<(String, Option<String>)> = headings
        .iter()
        .map(|(_, h)| {
            (
                h.title.clone(),
                h.parent
                    .and_then(|p| list.heading(p))
                    .map(|p| p.title.clone()),
            )
        })
        .collect();
    assert_eq!(
        parents,
        vec![
            ("A".to_string(), None),
            ("B".to_string(), Some("A".to_string())),
            ("C".to_string(), Some("B".to_string())),
            ("D".to_string(), Some("A".to_string())),
            ("E".to_string(), None),
        ]
    );
    for (_, heading) in headings {
        if let Some(parent) = heading.parent.and_then(|p| list.heading(p)) {
            assert!(parent.level < heading.level);
        }
    }
}

#[test]
fn setup_blocks_stay_in_order_and_attach_to_heading() {
    let list = build("# Build\n\n```bash setup\nexport X=1\n```\n\n```bash\necho $X\n```\n");
    let segments = list.segments();
    assert!(matches!(segments[0], Segment::Heading(_)));
    assert!(matches!(segments[1], Segment::Setup(_)));
    assert!(matches!(segments[2], Segment::Code(_)));
    let heading = list.heading(0).expect("heading");
    assert_eq!(heading.setups, vec![1]);
    let setup = list.setup(1).expect("setup");
    assert!(!setup.has_run());
    setup.mark_run();
    assert!(list.setup(1).expect("setup").has_run());
}

#[test]
fn short_code_and_description_come_from_annotations() {
    let list = build(
        "# Install <r label=inst/>\n\n<r desc>Installs everything</r> needed.\n\n## Check\n\n<r label=chk desc=\"Checks things\"/>\n",
    );
    let install = list.heading(0).expect("install heading");
    assert_eq!(install.title, "Install");
    assert_eq!(install.short_code.as_deref(), Some("inst"));
    assert_eq!(install.description.as_deref(), Some("Installs everything"));

    let check_idx = list.find_short_code("chk").expect("check heading");
    let check = list.heading(check_idx).expect("heading");
    assert_eq!(check.description.as_deref(), Some("Checks things"));
    assert_eq!(list.heading_chain(check_idx), vec![0, check_idx]);
}

#[test]
fn next_heading_at_or_above_skips_deeper_sections() {
    let list = build("# A\n\n```bash\necho\n```\n\n## A1\n\nx\n\n# B\n");
    let code_idx = list
        .segments()
        .iter()
        .position(Segment::is_code)
        .expect("code");
    let next = list.next_heading_at_or_above(code_idx, 1);
    assert_eq!(list.heading(next).map(|h| h.title.as_str()), Some("B"));
    assert_eq!(list.next_heading_at_or_above(next, 1), list.len());
}

#[test]
fn unknown_annotations_become_diagnostics() {
    let list = build("Text\n\n```bash sparkle\necho\n```\n");
    assert_eq!(list.diagnostics().len(), 1);
    assert_eq!(list.diagnostics()[0].line, 3);
}

#[test]
fn tag_on_the_line_above_a_fence_annotates_it() {
    let list = build("<r nospin/>\n```bash\necho hi\n```\n");
    match list.segments() {
        [Segment::Code(code)] => {
            assert_eq!(code.source, "echo hi\n");
            assert!(code.annotations.has(Flag::NoSpin));
            assert_eq!(code.line, 3);
        }
        other => panic!("expected one code segment, got {other:?}"),
    }
}

#[test]
fn hidden_code_reports_document_lines() {
    let list = build("Intro\n\nMore\n\n<!--~\n```bash\nfalse\n```\n-->\n");
    let code = list
        .segments()
        .iter()
        .find_map(|segment| match segment {
            Segment::Code(code) => Some(code),
            _ => None,
        })
        .expect("hidden code segment");
    assert_eq!(code.line, 7);

    let list = build("Intro\n\n<!--~\n\n```bash sparkle\necho\n```\n-->\n");
    assert_eq!(list.diagnostics().len(), 1);
    assert_eq!(list.diagnostics()[0].line, 5);
}
