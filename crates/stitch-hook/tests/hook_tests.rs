/// Integration tests for registering, patching and invoking targets

use std::sync::Arc;

use stitch_hook::{
    Environment, Hooks, InsertionError, InvocationError, Registry, SourceUnit, Value,
};

const HOST: &str = r#"
@target
def testing_fn(): # Line -1
    a = 5 # Line 0
    b = 6
    print("hello!")
    print(a)
    print(b)
    c = a + b
    print(c)
    return c

@patch("testing_fn", 6)
def testing_fn_mod():
    def nested_function_testing(c):
        return c + 7

    c = nested_function_testing(c)
"#;

/// Helper to load a unit from a file, the way mods are shipped
fn load_file(hooks: &Hooks, source: &str) -> stitch_hook::LoadReport {
    let temp_dir = std::env::temp_dir();
    let path = temp_dir.join(format!("mod_{}.st", rand::random::<u32>()));
    std::fs::write(&path, source).expect("failed to write unit");

    let unit = SourceUnit::from_path(&path).expect("failed to read unit");
    let report = hooks
        .load(&unit, &Environment::with_builtins())
        .expect("load failed");

    let _ = std::fs::remove_file(&path);
    report
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::from).collect()
}

#[test]
fn test_nested_routine_patch() {
    let hooks = Hooks::new();
    let report = load_file(&hooks, HOST);
    assert_eq!(report.targets, vec!["testing_fn"]);
    assert_eq!(report.patches[0].lines, 4);

    let composed = hooks.composed_source("testing_fn").unwrap();
    let lines: Vec<&str> = composed.lines().collect();
    assert_eq!(lines[8], "    print(c)");
    assert_eq!(lines[9], "    def nested_function_testing(c):");
    assert_eq!(lines[10], "        return c + 7");
    assert_eq!(lines[12], "    c = nested_function_testing(c)");
    assert_eq!(lines[13], "    return c");
    assert_eq!(hooks.line_count("testing_fn"), Some(14));

    assert_eq!(hooks.invoke("testing_fn", vec![]).unwrap(), Value::from(18i64));
}

#[test]
fn test_sum_plus_constant() {
    let source = r#"
@target
def add(a, b):
    c = a + b
    return c

@patch("add", 0)
def plus_seven():
    c = c + 7
"#;
    let hooks = Hooks::new();
    load_file(&hooks, source);
    for (a, b) in [(1, 2), (-4, 10), (0, 0)] {
        let result = hooks.invoke("add", ints(&[a, b])).unwrap();
        assert_eq!(result, Value::from(a + b + 7));
    }
}

#[test]
fn test_patches_from_separate_units() {
    let host = "@target\ndef greet(name):\n    msg = \"hi \" + name\n    return msg\n";
    let first = "@patch(\"greet\", 0)\ndef shout():\n    msg = msg + \"!\"\n";
    let second = "@patch(\"greet\", -1)\ndef trim():\n    name = name + \" \"\n";

    let hooks = Hooks::new();
    load_file(&hooks, host);
    load_file(&hooks, first);
    load_file(&hooks, second);

    let result = hooks.invoke("greet", vec![Value::from("bo")]).unwrap();
    assert_eq!(result, Value::from("hi bo !"));
}

#[test]
fn test_reregistration_discards_patches() {
    let hooks = Hooks::new();
    load_file(&hooks, HOST);
    let unit = SourceUnit::new("host", HOST);
    hooks
        .register_target(&unit, "testing_fn", Arc::new(Environment::with_builtins()))
        .unwrap();
    assert_eq!(hooks.line_count("testing_fn"), Some(10));
    assert_eq!(hooks.invoke("testing_fn", vec![]).unwrap(), Value::from(11i64));
}

#[test]
fn test_out_of_range_leaves_target_untouched() {
    let hooks = Hooks::new();
    load_file(&hooks, HOST);
    let before = hooks.registry().snapshot("testing_fn").unwrap();
    let unit = SourceUnit::new("host", HOST);

    // 8 original body lines plus the 4 spliced in
    let err = hooks
        .apply_patch(&unit, "testing_fn_mod", "testing_fn", 12)
        .unwrap_err();
    assert!(matches!(
        err,
        stitch_hook::HookError::Insertion(InsertionError::AnchorOutOfRange {
            anchor: 12,
            line_count: 12
        })
    ));
    assert_eq!(hooks.registry().snapshot("testing_fn").unwrap(), before);
}

#[test]
fn test_concurrent_insertions() {
    let registry = Registry::new();
    registry.register(
        "counter",
        "def counter():\n    c = 0\n    c += 0\n    return c".to_string(),
        None,
        Arc::new(Environment::empty()),
    );

    std::thread::scope(|scope| {
        for i in 0..8 {
            let registry = &registry;
            scope.spawn(move || {
                let patch = "def bump():\n    c += 1\n    c += 1";
                registry.insert("counter", i % 2, patch).unwrap();
            });
        }
    });

    let snapshot = registry.snapshot("counter").unwrap();
    assert_eq!(snapshot.logical_line_count, 3 + 8 * 2);
    assert_eq!(snapshot.offsets.values().sum::<usize>(), 16);
    assert_eq!(registry.invoke("counter", vec![]).unwrap(), Value::from(16i64));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_async_invocations() {
    let source = r#"
@target
async def fetch(x):
    await sleep(5)
    y = x
    return y

@patch("fetch", 1)
def double():
    y = y * 2
"#;
    let hooks = Arc::new(Hooks::new());
    load_file(&hooks, source);

    let err = hooks.invoke("fetch", ints(&[1])).unwrap_err();
    assert!(matches!(err, InvocationError::AsyncTarget { .. }));

    let tasks: Vec<_> = (0..4i64)
        .map(|i| {
            let hooks = hooks.clone();
            tokio::spawn(async move { hooks.invoke_async("fetch", ints(&[i])).await })
        })
        .collect();
    for (i, task) in tasks.into_iter().enumerate() {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result, Value::from(i as i64 * 2));
    }
}

#[test]
fn test_routine_error_surfaces() {
    let source = r#"
@target
def divide(a, b):
    return a / b

@patch("divide", -1)
def guard():
    if b == 0:
        raise "division by zero"
"#;
    let hooks = Hooks::new();
    load_file(&hooks, source);
    assert_eq!(hooks.invoke("divide", ints(&[6, 3])).unwrap(), Value::from(2i64));
    let err = hooks.invoke("divide", ints(&[1, 0])).unwrap_err();
    match err {
        InvocationError::Routine(stitch_eval::Error::Exception(value)) => {
            assert_eq!(value, Value::from("division by zero"));
        }
        other => panic!("Expected exception, got {:?}", other),
    }
}
