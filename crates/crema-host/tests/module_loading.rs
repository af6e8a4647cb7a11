//! Module loading integration tests
//!
//! Drives whole import graphs through `Context::evaluate_module` with the
//! stock loaders and a few purpose-built ones.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use crema_host::{
    Context, HostError, InMemoryModuleLoader, JsValue, LoaderError, Module, ModuleKind, ModuleLoader, ModuleRecord,
    NativeModule, Runtime, RuntimeConfig, ScriptModule,
};

fn new_context() -> Context {
    let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
    runtime.create_context().unwrap()
}

fn loader(modules: InMemoryModuleLoader) -> Option<Rc<dyn ModuleLoader>> {
    Some(Rc::new(modules))
}

fn script_error(result: crema_host::Result<JsValue>) -> String {
    match result {
        Err(HostError::Script { message }) => message,
        Err(other) => panic!("expected a script error, got {other}"),
        Ok(value) => panic!("expected a script error, got {:?}", value.to_js_string()),
    }
}

/// Counts lookups per name before delegating.
struct CountingLoader {
    modules: InMemoryModuleLoader,
    calls: RefCell<HashMap<String, usize>>,
}

impl CountingLoader {
    fn calls(&self, name: &str) -> usize {
        self.calls.borrow().get(name).copied().unwrap_or(0)
    }
}

#[async_trait(?Send)]
impl ModuleLoader for CountingLoader {
    async fn get_module(&self, name: &str) -> Result<Option<Rc<dyn Module>>, LoaderError> {
        *self.calls.borrow_mut().entry(name.to_string()).or_default() += 1;
        self.modules.get_module(name).await
    }
}

/// Fails every lookup.
struct FailingLoader;

#[async_trait(?Send)]
impl ModuleLoader for FailingLoader {
    async fn get_module(&self, _name: &str) -> Result<Option<Rc<dyn Module>>, LoaderError> {
        Err(Box::new(std::io::Error::new(std::io::ErrorKind::NotFound, "not found")))
    }
}

/// Waits on a tokio timer before answering.
struct SlowLoader;

#[async_trait(?Send)]
impl ModuleLoader for SlowLoader {
    async fn get_module(&self, name: &str) -> Result<Option<Rc<dyn Module>>, LoaderError> {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        Ok(Some(Rc::new(ScriptModule::new(name, "export default 'late';"))))
    }
}

/// Claims to be a script module but exports a number.
struct NotAScript;

impl Module for NotAScript {
    fn name(&self) -> &str {
        "shapeless"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Script
    }

    fn export_default(&self, context: &Context, _record: Option<&ModuleRecord>) -> Result<JsValue, LoaderError> {
        Ok(context.create_number(7.0)?)
    }
}

/// Panics on every lookup.
struct PanickingLoader;

#[async_trait(?Send)]
impl ModuleLoader for PanickingLoader {
    async fn get_module(&self, _name: &str) -> Result<Option<Rc<dyn Module>>, LoaderError> {
        panic!("disk on fire")
    }
}

/// Script module named `child` that imports its graph's root by name.
struct ImportsRoot;

impl Module for ImportsRoot {
    fn name(&self) -> &str {
        "child"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Script
    }

    fn export_default(&self, context: &Context, record: Option<&ModuleRecord>) -> Result<JsValue, LoaderError> {
        let root = record.and_then(ModuleRecord::parent).ok_or("child record has no root")?;
        // Linking only succeeds if the import resolves to this module.
        let source = format!(
            "import {{ marker as own }} from '{}'; export const marker = 'child'; export default 7;",
            root.name()
        );
        Ok(context.create_string(&source)?)
    }
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_script_module_import() {
    let context = new_context();
    let modules = InMemoryModuleLoader::new().with_module(ScriptModule::new("answer", "export default 21*2;"));

    let value = context
        .evaluate_module("import a from 'answer'; export default a;", loader(modules))
        .unwrap();
    assert_eq!(value.as_number().unwrap(), Some(42.0));
}

#[test]
fn test_value_module_import() {
    let context = new_context();
    let modules = InMemoryModuleLoader::new().with_module(NativeModule::new("num", |context, _| {
        Ok(context.create_number(42.0)?)
    }));

    let value = context
        .evaluate_module("import n from 'num'; export default n;", loader(modules))
        .unwrap();
    assert_eq!(value.as_number().unwrap(), Some(42.0));
}

#[test]
fn test_module_without_imports() {
    let context = new_context();
    let value = context.evaluate_module("export default 'plain';", None).unwrap();
    assert_eq!(value.as_str().unwrap().as_deref(), Some("plain"));

    let roots = context.module_records();
    assert_eq!(roots.len(), 1);
    assert!(roots[0].is_root());
    assert!(roots[0].is_ready());
}

#[test]
fn test_loader_error_reaches_script() {
    let context = new_context();
    let message = script_error(context.evaluate_module("import m from 'missing'; export default m;", Some(Rc::new(FailingLoader))));
    assert!(message.contains("missing"), "{message}");
    assert!(message.contains("not found"), "{message}");
    assert!(message.contains("An error occurred while attempting to load a module named missing"));
}

#[test]
fn test_loader_panic_names_the_import() {
    let context = new_context();
    let message = script_error(
        context.evaluate_module("import x from 'wanted'; export default x;", Some(Rc::new(PanickingLoader))),
    );
    assert!(
        message.contains("An error occurred while attempting to load a module named wanted"),
        "{message}"
    );
    assert!(message.contains("disk on fire"), "{message}");

    let roots = context.module_records();
    assert!(!roots[0].is_ready());
    assert!(!message.contains(roots[0].name()), "{message}");
}

#[test]
fn test_unknown_module_is_not_found() {
    let context = new_context();
    let message = script_error(context.evaluate_module(
        "import x from 'nope'; export default x;",
        loader(InMemoryModuleLoader::new()),
    ));
    assert!(message.contains("Cannot find module 'nope'"), "{message}");
}

#[test]
fn test_imports_without_a_loader_are_not_found() {
    let context = new_context();
    let message = script_error(context.evaluate_module("import x from 'anything'; export default x;", None));
    assert!(message.contains("Cannot find module 'anything'"), "{message}");
}

#[test]
fn test_shared_module_loaded_once() {
    let context = new_context();
    let counting = Rc::new(CountingLoader {
        modules: InMemoryModuleLoader::new()
            .with_module(ScriptModule::new("shared.js", "export default 20;"))
            .with_module(ScriptModule::new("a", "import shared from 'shared.js'; export default shared + 1;"))
            .with_module(ScriptModule::new("b", "import shared from 'shared.js'; export default shared + 2;")),
        calls: RefCell::new(HashMap::new()),
    });

    let value = context
        .evaluate_module(
            "import a from 'a'; import b from 'b'; export default a + b;",
            Some(counting.clone() as Rc<dyn ModuleLoader>),
        )
        .unwrap();
    assert_eq!(value.as_number().unwrap(), Some(43.0));
    assert_eq!(counting.calls("shared.js"), 1);
    assert_eq!(counting.calls("a"), 1);
    assert_eq!(counting.calls("b"), 1);
}

#[test]
fn test_shared_module_is_one_instance() {
    let context = new_context();
    let modules = InMemoryModuleLoader::new()
        .with_module(NativeModule::new("shared", |context, _| Ok(context.create_object()?)))
        .with_module(ScriptModule::new("a", "import s from 'shared'; export default s;"))
        .with_module(ScriptModule::new("b", "import s from 'shared'; export default s;"));

    let value = context
        .evaluate_module("import a from 'a'; import b from 'b'; export default a === b;", loader(modules))
        .unwrap();
    assert_eq!(value.as_bool().unwrap(), Some(true));

    let roots = context.module_records();
    let root = &roots[0];
    assert_eq!(root.imported_module_names(), vec!["a", "b", "shared"]);
    let shared = root.imported_module("shared").unwrap();
    assert_eq!(shared.parent().unwrap().handle(), root.handle());
}

#[test]
fn test_self_import_reuses_the_record() {
    let context = new_context();
    let modules = InMemoryModuleLoader::new().with_module(ScriptModule::new(
        "self",
        "import me from 'self'; export default 5;",
    ));

    let value = context
        .evaluate_module("import s from 'self'; export default s;", loader(modules))
        .unwrap();
    assert_eq!(value.as_number().unwrap(), Some(5.0));

    let roots = context.module_records();
    let root = &roots[0];
    assert_eq!(root.imported_module_names(), vec!["self"]);
    // The root plus one record for "self".
    assert_eq!(context.module_record_factory().len(), 2);
}

#[test]
fn test_import_of_the_root_name_resolves_to_the_importer() {
    let context = new_context();
    let counting = Rc::new(CountingLoader {
        modules: InMemoryModuleLoader::new().with_module(ImportsRoot),
        calls: RefCell::new(HashMap::new()),
    });

    let value = context
        .evaluate_module(
            "import c from 'child'; export default c;",
            Some(counting.clone() as Rc<dyn ModuleLoader>),
        )
        .unwrap();
    assert_eq!(value.as_number().unwrap(), Some(7.0));

    let roots = context.module_records();
    let root = &roots[0];
    assert_eq!(counting.calls("child"), 1);
    assert_eq!(counting.calls(root.name()), 0);
    assert_eq!(root.imported_module_names(), vec!["child"]);
    // The root plus "child"; the import of the root's name made no record.
    assert_eq!(context.module_record_factory().len(), 2);
}

#[test]
fn test_import_cycle_back_to_referencing_module() {
    let context = new_context();
    let modules = InMemoryModuleLoader::new()
        .with_module(ScriptModule::new("even", "import odd from 'odd'; export default 'even';"))
        .with_module(ScriptModule::new("odd", "import even from 'even'; export default 'odd';"));

    let value = context
        .evaluate_module("import e from 'even'; export default e;", loader(modules))
        .unwrap();
    assert_eq!(value.as_str().unwrap().as_deref(), Some("even"));
    assert_eq!(context.module_records()[0].imported_module_names(), vec!["even", "odd"]);
}

#[test]
fn test_async_loader_can_use_tokio() {
    let context = new_context();
    let value = context
        .evaluate_module("import l from 'later'; export default l;", Some(Rc::new(SlowLoader)))
        .unwrap();
    assert_eq!(value.as_str().unwrap().as_deref(), Some("late"));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_script_module_must_export_a_string() {
    let context = new_context();
    let mut modules = InMemoryModuleLoader::new();
    modules.register_module(NotAScript);

    let message = script_error(context.evaluate_module("import s from 'shapeless'; export default s;", loader(modules)));
    assert!(
        message.contains("The module shapeless implements a script module and is expected to return a string based module"),
        "{message}"
    );
}

#[test]
fn test_native_export_failure() {
    let context = new_context();
    let modules = InMemoryModuleLoader::new().with_module(NativeModule::new("broken", |_, _| Err("boom".into())));

    let message = script_error(context.evaluate_module("import b from 'broken'; export default b;", loader(modules)));
    assert!(
        message.contains("An error occurred while obtaining the default export of the native module named broken: boom"),
        "{message}"
    );
}

#[test]
fn test_syntax_error_in_imported_module() {
    let context = new_context();
    let modules = InMemoryModuleLoader::new().with_module(ScriptModule::new("bad", "export default ;"));

    let message = script_error(context.evaluate_module("import b from 'bad'; export default b;", loader(modules)));
    assert!(message.contains("SyntaxError"), "{message}");
}

#[test]
fn test_syntax_error_in_root() {
    let context = new_context();
    let message = script_error(context.evaluate_module("export default ;", None));
    assert!(message.contains("SyntaxError"), "{message}");
    assert!(!context.module_records()[0].is_ready());
}

#[test]
fn test_thrown_string_message() {
    let context = new_context();
    let message = script_error(context.evaluate_module("throw 'foo';", None));
    assert_eq!(message, "foo");
}

#[test]
fn test_exception_stays_pending() {
    let context = new_context();
    script_error(context.evaluate_module("throw new Error('kaput');", None));
    assert!(context.has_exception().unwrap());

    let exception = context.get_and_clear_exception().unwrap().unwrap();
    assert_eq!(exception.get("message").unwrap().as_str().unwrap().as_deref(), Some("kaput"));
    assert!(!context.has_exception().unwrap());
    assert!(context.get_and_clear_exception().unwrap().is_none());

    let value = context.evaluate_module("export default 1;", None).unwrap();
    assert_eq!(value.as_number().unwrap(), Some(1.0));
}

#[test]
fn test_failed_graph_is_never_ready() {
    let context = new_context();
    script_error(context.evaluate_module("import x from 'x'; export default x;", None));
    let roots = context.module_records();
    let root = &roots[0];
    assert!(!root.is_ready());
    assert!(context.get_and_clear_exception().unwrap().is_some());
}

// ============================================================================
// Single-value modules
// ============================================================================

#[test]
fn test_host_object_round_trip() {
    let context = new_context();
    let exported: Rc<RefCell<Option<JsValue>>> = Rc::new(RefCell::new(None));
    let slot = exported.clone();
    let modules = InMemoryModuleLoader::new().with_module(NativeModule::new("thing", move |context, _| {
        let object = context.create_object()?;
        object.set("kind", &context.create_string("thing")?)?;
        *slot.borrow_mut() = Some(object.clone());
        Ok(object)
    }));

    let value = context
        .evaluate_module("import t from 'thing'; export default t;", loader(modules))
        .unwrap();
    let original = exported.borrow().clone().unwrap();
    assert!(value.strict_equals(&original).unwrap());
    assert_eq!(value.get("kind").unwrap().as_str().unwrap().as_deref(), Some("thing"));
}

#[test]
fn test_primitive_round_trip() {
    let context = new_context();
    let modules = InMemoryModuleLoader::new()
        .with_module(NativeModule::new("text", |context, _| Ok(context.create_string("héllo")?)))
        .with_module(NativeModule::new("flag", |context, _| Ok(context.create_bool(false)?)))
        .with_module(NativeModule::new("nothing", |context, _| Ok(context.null()?)));

    let value = context
        .evaluate_module(
            "import t from 'text'; import f from 'flag'; import n from 'nothing'; export default t + ':' + f + ':' + n;",
            loader(modules),
        )
        .unwrap();
    assert_eq!(value.as_str().unwrap().as_deref(), Some("héllo:false:null"));
}

#[test]
fn test_native_module_sees_the_importer() {
    let context = new_context();
    let importers: Rc<RefCell<Vec<Option<String>>>> = Rc::new(RefCell::new(Vec::new()));
    let seen = importers.clone();
    let modules = InMemoryModuleLoader::new()
        .with_module(NativeModule::new("observer", move |context, importer| {
            seen.borrow_mut().push(importer.map(|record| record.name().to_string()));
            Ok(context.undefined()?)
        }))
        .with_module(ScriptModule::new("user", "import o from 'observer'; export default 'user';"));

    context
        .evaluate_module("import u from 'user'; export default u;", loader(modules))
        .unwrap();
    assert_eq!(*importers.borrow(), vec![Some("user".to_string())]);
}

// ============================================================================
// Disposal
// ============================================================================

#[test]
fn test_dispose_cascades_to_imports() {
    let context = new_context();
    let modules = InMemoryModuleLoader::new()
        .with_module(ScriptModule::new("leaf", "export default 1;"))
        .with_module(ScriptModule::new("mid", "import leaf from 'leaf'; export default leaf + 1;"))
        .with_module(NativeModule::new("value", |context, _| Ok(context.create_number(3.0)?)));

    context
        .evaluate_module(
            "import mid from 'mid'; import v from 'value'; export default mid + v;",
            loader(modules),
        )
        .unwrap();

    let root = context.module_records()[0].clone();
    let children: Vec<ModuleRecord> = root
        .imported_module_names()
        .iter()
        .filter_map(|name| root.imported_module(name))
        .collect();
    assert_eq!(children.len(), 3);
    assert_eq!(context.module_record_factory().len(), 4);

    root.dispose();
    assert!(root.is_disposed());
    assert!(children.iter().all(ModuleRecord::is_disposed));
    assert!(root.imported_module_names().is_empty());
    assert!(context.module_record_factory().is_empty());

    root.dispose();
    context.dispose();
    assert!(context.is_disposed());
}

#[test]
fn test_context_dispose_releases_modules() {
    let context = new_context();
    context.evaluate_module("export default 1;", None).unwrap();
    context.evaluate_module("export default 2;", None).unwrap();
    let roots = context.module_records();
    assert_eq!(roots.len(), 2);

    context.dispose();
    assert!(roots.iter().all(ModuleRecord::is_disposed));
    assert!(context.module_records().is_empty());
    assert!(matches!(context.create_string("x"), Err(HostError::Disposed("context"))));
    assert!(matches!(
        context.evaluate_module("export default 3;", None),
        Err(HostError::Disposed("context"))
    ));

    context.dispose();
}

#[test]
fn test_values_fail_after_context_drop() {
    let context = new_context();
    let value = context.create_string("orphan").unwrap();
    drop(context);
    assert!(matches!(value.to_js_string(), Err(HostError::Disposed("context"))));
}

// ============================================================================
// Scopes and collection
// ============================================================================

#[test]
fn test_nested_scope_is_rejected() {
    let context = new_context();
    let scope = context.scope().unwrap();
    assert!(context.has_current_scope());
    assert!(matches!(context.scope(), Err(HostError::ScopeActive)));

    // Work inside the open scope still goes through.
    let value = scope.context().evaluate_module("export default 'inside';", None).unwrap();
    assert_eq!(value.as_str().unwrap().as_deref(), Some("inside"));

    drop(scope);
    assert!(!context.has_current_scope());
    assert!(context.scope().is_ok());
}

#[test]
fn test_scope_blocks_other_contexts() {
    let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
    let first = runtime.create_context().unwrap();
    let second = runtime.create_context().unwrap();

    let _scope = first.scope().unwrap();
    assert!(matches!(second.create_string("x"), Err(HostError::ScopeActive)));
    assert!(first.create_string("x").is_ok());
}

#[test]
fn test_before_collect_hook_runs() {
    let context = new_context();
    let collected = Rc::new(Cell::new(false));
    let flag = collected.clone();

    let object = context.create_object().unwrap();
    context.on_before_collect(&object, move || flag.set(true)).unwrap();
    context.runtime().collect_garbage().unwrap();
    assert!(!collected.get());

    drop(object);
    context.runtime().collect_garbage().unwrap();
    assert!(collected.get());
}

#[test]
fn test_symbol_for_is_registered() {
    let context = new_context();
    let a = context.symbol_for("key").unwrap();
    let b = context.symbol_for("key").unwrap();
    assert!(a.strict_equals(&b).unwrap());
    assert!(matches!(a.to_js_string(), Err(HostError::Script { .. })));
    assert!(context.get_and_clear_exception().unwrap().is_some());
}
