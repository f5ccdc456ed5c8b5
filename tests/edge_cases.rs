use inku::{render_template, Context, DiagnosticKind, Value};

// ── Edge cases for the directive language ──

#[test]
fn empty_list_produces_empty_output() {
    let template = "{{for(m in messages)}}{{?m}}{{endfor}}";
    let ctx = Context::new().with("messages", Vec::<Value>::new());
    let rendered = render_template(template, &ctx).unwrap();
    assert_eq!(rendered.output, "");
}

#[test]
fn plain_text_template_no_tags() {
    let rendered = render_template("Hello, world!", &Context::new()).unwrap();
    assert_eq!(rendered.output, "Hello, world!");
}

#[test]
fn context_var_outside_loop() {
    let template = "{{?open}}PROMPT{{?close}}";
    let ctx = Context::new().with("open", "<s>").with("close", "</s>");
    let rendered = render_template(template, &ctx).unwrap();
    assert_eq!(rendered.output, "<s>PROMPT</s>");
}

#[test]
fn dot_access_and_bracket_access_equivalent() {
    let user = Value::from(serde_json::json!({"role": "user"}));
    let ctx = Context::new().with("people", vec![user]);
    let a = render_template("{{for(p in people)}}{{?p.role}}{{endfor}}", &ctx).unwrap();
    let b = render_template("{{for(p in people)}}{{?p['role']}}{{endfor}}", &ctx).unwrap();
    assert_eq!(a.output, b.output);
    assert_eq!(a.output, "user");
}

#[test]
fn zero_count_loop_renders_nothing() {
    let rendered = render_template("a{{for(i in 0)}}x{{endfor}}b", &Context::new()).unwrap();
    assert_eq!(rendered.output, "ab");
    assert!(rendered.diagnostics.is_empty());
}

#[test]
fn if_inside_for_sees_loop_variable() {
    let template = "{{for(i in 4)}}{{if(i % 2 == 0)}}{{?i}}{{endif}}{{endfor}}";
    let rendered = render_template(template, &Context::new()).unwrap();
    assert_eq!(rendered.output, "02");
}

#[test]
fn or_operator_in_condition() {
    let template = "{{for(r in roles)}}{{if(r == 'user' || r == 'assistant')}}Y{{endif}}{{if(!(r == 'user' || r == 'assistant'))}}N{{endif}}{{endfor}}";
    let ctx = Context::new().with("roles", vec!["system", "user", "assistant"]);
    let rendered = render_template(template, &ctx).unwrap();
    assert_eq!(rendered.output, "NYY");
}

#[test]
fn string_concat_multiple_parts() {
    let template = "{{?'A' + 'B' + 'C' + role + 'D'}}";
    let ctx = Context::new().with("role", "x");
    let rendered = render_template(template, &ctx).unwrap();
    assert_eq!(rendered.output, "ABCxD");
}

#[test]
fn special_characters_are_not_escaped() {
    let ctx = Context::new().with("content", "Hello <world> & \"friends\"");
    let rendered = render_template("{{?content}}", &ctx).unwrap();
    assert_eq!(rendered.output, "Hello <world> & \"friends\"");
}

#[test]
fn unicode_content() {
    let ctx = Context::new().with("content", "こんにちは 🌍");
    let rendered = render_template("«{{?content}}»", &ctx).unwrap();
    assert_eq!(rendered.output, "«こんにちは 🌍»");
}

#[test]
fn missing_flag_is_unevaluable_not_false() {
    let template = "x{{if(add_prompt)}}PROMPT{{endif}}";
    let rendered = render_template(template, &Context::new()).unwrap();
    assert_eq!(rendered.output, "x");
    assert_eq!(rendered.diagnostics[0].kind, DiagnosticKind::Evaluation);
}

#[test]
fn unmatched_endif_keeps_surrounding_text() {
    let rendered = render_template("a{{endif}}b{{ endfor }}c", &Context::new()).unwrap();
    assert_eq!(rendered.output, "abc");
    assert_eq!(rendered.diagnostics.len(), 2);
}

#[test]
fn stray_braces_and_unknown_directives_are_text() {
    let template = "{ {{x}} }} {{?}}";
    let rendered = render_template(template, &Context::new()).unwrap();
    assert_eq!(rendered.output, "{ {{x}} }} ");
    assert_eq!(rendered.diagnostics.len(), 1);
}

#[test]
fn huge_loop_count_is_refused_not_allocated() {
    let rendered = render_template("{{for(i in 9999999999999999999)}}{{endfor}}", &Context::new()).unwrap();
    assert_eq!(rendered.output, "");
    assert_eq!(rendered.diagnostics[0].kind, DiagnosticKind::UnsupportedIterable);
}
