use indoc::indoc;
use serde_json::json;
use weaver_json::{
    ClosureFunction, CompileError, EvalErrorKind, Template, TemplateError, TemplateOptions, Value,
};

const REFERENCE_TEMPLATE: &str = indoc! {r#"
    {
        "test": "data.test",
        "sub1": "has(data.sub1) ? data.sub1 : ref.sub1Default",
        "sub1.2": "data.doesnotexist",
        "sub2": {
            "name": "data.name",
            "age": 44
        },
        "sub3": [1, 2, 3, "data.age"],
        "sub4": [
            {"first": "data.age"},
            {"second": 3}
        ],
        "stringtest": "'lit'",
        "fragtest": "ref.fragtest ? fragment('frag1') : ''",
        "fragtest2": "ref.fragtest2 ? fragment('frag2', data) : ''"
    }
"#};

fn reference_input() -> serde_json::Value {
    json!({
        "test": "avalue",
        "name": "a test name",
        "age": 40,
        "sub1": 88,
        "status": 2,
        "person": {
            "Name": "Bob",
            "Age": 22,
            "Address": {
                "Line1": "Here Street",
                "Line2": "There city"
            }
        },
        "list1": [1, 2, 3, 4, 5, 6, 7, 8, 9]
    })
}

fn expand(template: &str, data: &serde_json::Value) -> String {
    Template::new(template)
        .expect("template should compile")
        .expand(data)
        .expect("expansion should succeed")
}

// ── Failure policy ──────────────────────────────────────────────────────

#[test]
fn test_missing_key_dropped_by_default() {
    let out = expand(REFERENCE_TEMPLATE, &reference_input());
    assert_eq!(
        out,
        r#"{"test":"avalue","sub1":88,"sub2":{"name":"a test name","age":44},"sub3":[1,2,3,40],"sub4":[{"first":40},{"second":3}],"stringtest":"lit"}"#
    );
}

#[test]
fn test_missing_key_errors_enabled() {
    let template = Template::with_options(
        REFERENCE_TEMPLATE,
        TemplateOptions::new().missing_key_errors(true),
    )
    .unwrap();
    match template.expand(&reference_input()) {
        Err(TemplateError::Eval(err)) => {
            assert_eq!(err.kind, EvalErrorKind::NoSuchKey);
            assert!(err.message.contains("doesnotexist"));
        }
        other => panic!("expected missing key failure, got {other:?}"),
    }
}

#[test]
fn test_missing_key_errors_leave_other_failures_alone() {
    let template = Template::with_options(
        r#"{"a": "data.age / 0", "b": "unbound", "c": "data.age"}"#,
        TemplateOptions::new().missing_key_errors(true),
    )
    .unwrap();
    assert_eq!(template.expand(&reference_input()).unwrap(), r#"{"c":40}"#);
}

#[test]
fn test_strict_errors_surface_everything() {
    let template = Template::with_options(
        r#"{"a": "data.age / 0", "c": "data.age"}"#,
        TemplateOptions::new().strict_errors(true),
    )
    .unwrap();
    match template.expand(&reference_input()) {
        Err(TemplateError::Eval(err)) => assert_eq!(err.kind, EvalErrorKind::ArithmeticError),
        other => panic!("expected arithmetic failure, got {other:?}"),
    }
}

#[test]
fn test_strict_errors_reject_undeclared_identifiers() {
    let text = r#"{"a": "data.name", "b": "dta.name"}"#;
    assert_eq!(expand(text, &reference_input()), r#"{"a":"a test name"}"#);

    match Template::with_options(text, TemplateOptions::new().strict_errors(true)) {
        Err(CompileError::Expression { path, errors, .. }) => {
            assert_eq!(path, "/b");
            assert!(errors[0].message.contains("dta"));
        }
        other => panic!("expected compile failure, got {other:?}"),
    }

    // Fragments see `args` and `ref`, never `data`
    let options = TemplateOptions::new()
        .strict_errors(true)
        .variable("tenant", "acme")
        .fragment("f", r#"{"d": "data.name"}"#);
    let err = Template::with_options(r#"{"t": "tenant"}"#, options).unwrap_err();
    assert!(matches!(err, CompileError::Fragment { ref name, .. } if name == "f"), "{err:?}");
}

#[test]
fn test_ref_defaults_to_empty_map() {
    let template = r#"{"r": "ref.fragtest", "k": "'kept'"}"#;
    assert_eq!(expand(template, &json!({})), r#"{"k":"kept"}"#);

    let strict = Template::with_options(template, TemplateOptions::new().missing_key_errors(true))
        .unwrap();
    match strict.expand(&json!({})) {
        Err(TemplateError::Eval(err)) => {
            assert_eq!(err.kind, EvalErrorKind::NoSuchKey);
            assert!(err.message.contains("fragtest"));
        }
        other => panic!("expected missing key failure, got {other:?}"),
    }

    assert_eq!(expand(r#"{"n": "size(ref)"}"#, &json!({})), r#"{"n":0}"#);
}

// ── Removal ─────────────────────────────────────────────────────────────

#[test]
fn test_remove_property() {
    let template = Template::with_options(
        r#"{"prop1": "data.name", "prop2": "remove_property()"}"#,
        TemplateOptions::new().missing_key_errors(true),
    )
    .unwrap();
    assert_eq!(
        template.expand(&reference_input()).unwrap(),
        r#"{"prop1":"a test name"}"#
    );
}

#[test]
fn test_remove_property_from_list() {
    let template = Template::with_options(
        r#"{"prop1": "data.name", "prop2": ["'retain'", "remove_property()", "'retain2'"]}"#,
        TemplateOptions::new().missing_key_errors(true),
    )
    .unwrap();
    assert_eq!(
        template.expand(&reference_input()).unwrap(),
        r#"{"prop1":"a test name","prop2":["retain","retain2"]}"#
    );
}

#[test]
fn test_conditional_remove() {
    let template = r#"{"adult": "data.age >= 18 ? 'yes' : remove_property()"}"#;
    assert_eq!(expand(template, &json!({"age": 40})), r#"{"adult":"yes"}"#);
    assert_eq!(expand(template, &json!({"age": 4})), r#"{}"#);
}

#[test]
fn test_remove_survives_strict_errors() {
    let template = Template::with_options(
        r#"["remove_property()", "1"]"#,
        TemplateOptions::new().strict_errors(true),
    )
    .unwrap();
    assert_eq!(template.expand(&json!({})).unwrap(), "[1]");
}

// ── Shape ───────────────────────────────────────────────────────────────

#[test]
fn test_nested_lists() {
    let out = expand(
        r#"{"l1": ["'l2'", "data.test", ["'l3'", "data.age", ["'l4'", "data.name"]]]}"#,
        &reference_input(),
    );
    assert_eq!(out, r#"{"l1":["l2","avalue",["l3",40,["l4","a test name"]]]}"#);
}

#[test]
fn test_list_of_failures_is_empty() {
    let out = expand(r#"{"l1": ["missing", "alsomissing"]}"#, &reference_input());
    assert_eq!(out, r#"{"l1":[]}"#);
}

#[test]
fn test_list_root() {
    let out = expand(r#"["data.name", {"age": "data.age"}, null, false]"#, &reference_input());
    assert_eq!(out, r#"["a test name",{"age":40},null,false]"#);
}

#[test]
fn test_template_key_order_is_kept() {
    let out = expand(r#"{"z": "1", "a": "2", "m": "3"}"#, &json!({}));
    assert_eq!(out, r#"{"z":1,"a":2,"m":3}"#);
}

#[test]
fn test_data_object_output() {
    let template = Template::new(r#"{"bob": "data.person"}"#).unwrap();
    let out = template.expand_to_json(&reference_input()).unwrap();
    assert_eq!(out["bob"]["Address"]["Line1"], "Here Street");

    // Input key order carries through
    assert_eq!(
        template.expand(&reference_input()).unwrap(),
        r#"{"bob":{"Name":"Bob","Age":22,"Address":{"Line1":"Here Street","Line2":"There city"}}}"#
    );
}

#[test]
fn test_data_list_output() {
    let out = expand(
        r#"{"alist": "data.list1.map(e, 'value' + string(e))", "secondlist": "data.list1"}"#,
        &reference_input(),
    );
    assert!(out.contains(r#""value4""#), "{out}");
    assert!(out.contains(r#""secondlist":[1,2,3,4,5,6,7,8,9]"#), "{out}");
}

#[test]
fn test_ref_data_lookup() {
    let template = Template::with_options(
        r#"{"medal": "ref.status[data.status]"}"#,
        TemplateOptions::new().reference(json!({
            "status": {"1": "Bronze", "2": "Silver", "3": "Gold"}
        })),
    )
    .unwrap();
    assert_eq!(template.expand(&reference_input()).unwrap(), r#"{"medal":"Silver"}"#);
}

#[test]
fn test_expression_language_in_templates() {
    let template = indoc! {r#"
        {
            "greeting": "'Hello, ' + data.person.Name.upperAscii()",
            "evens": "data.list1.filter(x, x % 2 == 0)",
            "anyBig": "data.list1.exists(x, x > 8)",
            "count": "size(data.list1)",
            "window": "data.list1.slice(2, 4)",
            "tags": "'a,b,c'.split(',').join('-')",
            "nested": "{'k': [data.age, data.age * 2]}",
            "hasPerson": "has(data.person.Address)",
            "inList": "3 in data.list1"
        }
    "#};
    assert_eq!(
        expand(template, &reference_input()),
        r#"{"greeting":"Hello, BOB","evens":[2,4,6,8],"anyBig":true,"count":9,"window":[3,4],"tags":"a-b-c","nested":{"k":[40,80]},"hasPerson":true,"inList":true}"#
    );
}

// ── Properties ──────────────────────────────────────────────────────────

#[test]
fn test_expansion_is_repeatable() {
    let template = Template::new(REFERENCE_TEMPLATE).unwrap();
    let first = template.expand(&reference_input()).unwrap();
    for _ in 0..5 {
        assert_eq!(template.expand(&reference_input()).unwrap(), first);
    }
}

#[test]
fn test_constant_template_ignores_input() {
    let template =
        Template::new(r#"{"a": "1 + 2", "b": ["'x'", true, null], "c": {"d": 2.5}}"#).unwrap();
    let expected = r#"{"a":3,"b":["x",true,null],"c":{"d":2.5}}"#;
    for data in [json!({}), json!([1, 2]), json!(null), reference_input()] {
        assert_eq!(template.expand(&data).unwrap(), expected);
    }
}

#[test]
fn test_shared_between_threads() {
    let template = Template::new(r#"{"n": "data.n * 10"}"#).unwrap();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let template = &template;
                scope.spawn(move || template.expand(&json!({ "n": n })).unwrap())
            })
            .collect();
        for (n, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), format!(r#"{{"n":{}}}"#, n * 10));
        }
    });
}

// ── Entry points ────────────────────────────────────────────────────────

#[test]
fn test_expand_str() {
    let template = Template::new(r#"{"name": "data.person.Name", "age": "data.age"}"#).unwrap();
    let out = template
        .expand_str(r#"{"age": 40, "person": {"Name": "Bob"}}"#)
        .unwrap();
    assert_eq!(out, r#"{"name":"Bob","age":40}"#);

    assert!(matches!(template.expand_str("{not json"), Err(TemplateError::Json(_))));
}

#[test]
fn test_expand_value_accepts_engine_values() {
    let template = Template::new(r#"{"first": "data[0]", "len": "size(data)"}"#).unwrap();
    let out = template
        .expand_value(Value::from(vec!["a", "b"]))
        .unwrap();
    assert_eq!(serde_json::to_string(&out).unwrap(), r#"{"first":"a","len":2}"#);
}

#[test]
fn test_render_helpers() {
    let out = weaver_json::render(r#"{"x": "data.x + 1"}"#, &json!({"x": 1})).unwrap();
    assert_eq!(out, r#"{"x":2}"#);

    let out = weaver_json::render_with_options(
        r#"{"x": "ref.base + data.x"}"#,
        TemplateOptions::new().reference(json!({"base": 10})),
        &json!({"x": 1}),
    )
    .unwrap();
    assert_eq!(out, r#"{"x":11}"#);
}

// ── Options ─────────────────────────────────────────────────────────────

#[test]
fn test_user_functions() {
    let options = TemplateOptions::new().function(ClosureFunction::new("shout", |_, args| {
        let text = args.first().and_then(Value::as_str).unwrap_or_default();
        Ok(Value::from(format!("{}!", text.to_uppercase())))
    }));
    let template = Template::with_options(r#"{"s": "shout(data.name)"}"#, options).unwrap();
    assert_eq!(template.expand(&reference_input()).unwrap(), r#"{"s":"A TEST NAME!"}"#);
}

#[test]
fn test_host_variables() {
    let options = TemplateOptions::new()
        .variable("version", 3i64)
        .variable("env", "prod");
    let text = r#"{"v": "version", "label": "env + '-' + data.name"}"#;
    let template = Template::with_options(text, options).unwrap();
    assert_eq!(
        template.expand(&json!({"name": "api"})).unwrap(),
        r#"{"v":3,"label":"prod-api"}"#
    );
}

// ── Compile failures ────────────────────────────────────────────────────

#[test]
fn test_invalid_json_fails_to_compile() {
    assert!(matches!(Template::new(r#"{"a": "1",}"#), Err(CompileError::Json(_))));
}

#[test]
fn test_scalar_root_fails_to_compile() {
    match Template::new(r#""data.name""#) {
        Err(CompileError::InvalidRoot { found }) => assert_eq!(found, "string"),
        other => panic!("expected invalid root, got {other:?}"),
    }
}

#[test]
fn test_bad_expression_reports_path() {
    match Template::new(r#"{"outer": [{"x": "data.name +"}]}"#) {
        Err(CompileError::Expression { path, expression, .. }) => {
            assert_eq!(path, "/outer/0/x");
            assert_eq!(expression, "data.name +");
        }
        other => panic!("expected expression error, got {other:?}"),
    }
}

#[test]
fn test_unknown_function_fails_to_compile() {
    let err = Template::new(r#"{"x": "nosuchfn(1)"}"#).unwrap_err();
    assert!(err.to_string().contains("nosuchfn"), "{err}");
}

#[test]
fn test_render_reports_compile_errors() {
    let err = weaver_json::render("[", &json!({})).unwrap_err();
    assert!(matches!(err, TemplateError::Compile(CompileError::Json(_))));
}
