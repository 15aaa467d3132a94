use super::*;

#[test]
fn tokenize_handles_every_value_form() {
    let tokens = tokenize(r#"nospin label="two words" with:'zsh -l' save=out.txt"#);
    assert_eq!(
        tokens,
        vec![
            Token::Flag("nospin".to_string()),
            Token::Param {
                name: "label".to_string(),
                value: "two words".to_string()
            },
            Token::Param {
                name: "with".to_string(),
                value: "zsh -l".to_string()
            },
            Token::Param {
                name: "save".to_string(),
                value: "out.txt".to_string()
            },
        ]
    );
}

#[test]
fn tokenize_unescapes_quotes_and_skips_nameless_values() {
    let tokens = tokenize(r#"desc="say \"hi\"" =stray"#);
    assert_eq!(
        tokens,
        vec![Token::Param {
            name: "desc".to_string(),
            value: "say \"hi\"".to_string()
        }]
    );
}

#[test]
fn tokenize_keeps_unterminated_quote_contents() {
    let tokens = tokenize("label=\"open ended");
    assert_eq!(
        tokens,
        vec![Token::Param {
            name: "label".to_string(),
            value: "open ended".to_string()
        }]
    );
}

#[test]
fn parse_normalizes_underscores() {
    let set = AnnotationSet::parse("skip_on_success named_all");
    assert!(set.has(Flag::SkipOnSuccess));
    assert!(set.has(Flag::NamedAll));
}

#[test]
fn parse_keeps_flag_and_param_names_disjoint() {
    let set = AnnotationSet::parse("desc desc=\"Heading text\"");
    assert!(!set.has(Flag::Desc));
    assert_eq!(set.param(Param::Desc), Some("Heading text"));

    let set = AnnotationSet::parse("desc=x desc");
    assert!(set.has(Flag::Desc));
    assert_eq!(set.param(Param::Desc), None);
}

#[test]
fn merge_with_empty_is_identity() {
    let set = AnnotationSet::parse("nospin env with=zsh label=setup");
    assert_eq!(set.merge(&AnnotationSet::new()), set);
    assert_eq!(AnnotationSet::new().merge(&set), set);
}

#[test]
fn merge_prefers_right_hand_side() {
    let left = AnnotationSet::parse("with=bash spinner=one reveal");
    let right = AnnotationSet::parse("with=zsh spinner");
    let merged = left.merge(&right);
    assert_eq!(merged.param(Param::With), Some("zsh"));
    assert!(merged.flags().any(|flag| flag == "spinner"));
    assert_eq!(merged.param(Param::Spinner), None);
    assert!(merged.has(Flag::Reveal));
}

#[test]
fn diagnostics_report_unknown_names_only() {
    let set = AnnotationSet::parse("nospin sparkle colour=red label=x");
    let diagnostics = set.diagnostics();
    assert_eq!(
        diagnostics,
        vec![
            AnnotationDiagnostic::UnknownFlag("sparkle".to_string()),
            AnnotationDiagnostic::UnknownParam("colour".to_string()),
        ]
    );
    assert_eq!(
        diagnostics[0].to_string(),
        "unknown annotation flag `sparkle`"
    );
}

#[test]
fn every_flag_name_round_trips() {
    for flag in Flag::ALL {
        assert_eq!(Flag::from_name(flag.name()), Some(flag));
    }
    for param in Param::ALL {
        assert_eq!(Param::from_name(param.name()), Some(param));
    }
}
