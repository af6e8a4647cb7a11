//! Stock loader integration tests

use std::fs;
use std::rc::Rc;

use crema_host::{
    AggregateModuleLoader, CremaConfig, FsModuleLoader, HostError, InMemoryModuleLoader, LoaderConfig, ModuleLoader,
    Runtime, RuntimeConfig, ScriptModule, TextModule,
};

fn write(dir: &tempfile::TempDir, name: &str, content: &str) {
    fs::write(dir.path().join(name), content).unwrap();
}

#[test]
fn test_fs_loader_module_kinds() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir, "lib.mjs", "import greeting from 'greeting.txt'; export default greeting + '!';");
    write(&dir, "greeting.txt", "hi");
    write(&dir, "config.json", r#"{"name": "crema", "sizes": [1, 2, 3]}"#);

    let context = Runtime::new(RuntimeConfig::default()).unwrap().create_context().unwrap();
    let loader: Rc<dyn ModuleLoader> = Rc::new(FsModuleLoader::new(LoaderConfig::with_base_dir(dir.path())));
    let value = context
        .evaluate_module(
            "import lib from 'lib'; import config from 'config'; export default config.name + ':' + lib + ':' + config.sizes.length;",
            Some(loader),
        )
        .unwrap();
    assert_eq!(value.as_str().unwrap().as_deref(), Some("crema:hi!:3"));
}

#[test]
fn test_fs_loader_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let context = Runtime::new(RuntimeConfig::default()).unwrap().create_context().unwrap();
    let loader: Rc<dyn ModuleLoader> = Rc::new(FsModuleLoader::new(LoaderConfig::with_base_dir(dir.path())));

    let result = context.evaluate_module("import x from 'absent'; export default x;", Some(loader));
    match result {
        Err(HostError::Script { message }) => assert!(message.contains("Cannot find module 'absent'"), "{message}"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_fs_loader_rejects_escaping_names() {
    let dir = tempfile::tempdir().unwrap();
    let context = Runtime::new(RuntimeConfig::default()).unwrap().create_context().unwrap();
    let loader: Rc<dyn ModuleLoader> = Rc::new(FsModuleLoader::new(LoaderConfig::with_base_dir(dir.path())));

    let result = context.evaluate_module("import x from '../outside'; export default x;", Some(loader));
    match result {
        Err(HostError::Script { message }) => {
            assert!(message.contains("attempting to load a module named ../outside"), "{message}")
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_fs_loader_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir, "answer.js", "export default 6 * 7;");
    let config_path = dir.path().join("crema.toml");
    fs::write(
        &config_path,
        format!("[loader]\nbase_dir = {:?}\nextensions = [\"js\"]\ntimeout_ms = 1000\n", dir.path()),
    )
    .unwrap();

    let config = CremaConfig::load(&config_path).unwrap();
    let runtime = Runtime::new(config.runtime.clone()).unwrap();
    let context = runtime.create_context().unwrap();
    let loader: Rc<dyn ModuleLoader> = Rc::new(FsModuleLoader::new(config.loader));

    let value = context
        .evaluate_module("import answer from 'answer'; export default answer;", Some(loader))
        .unwrap();
    assert_eq!(value.as_number().unwrap(), Some(42.0));
}

#[test]
fn test_aggregate_routes_by_prefix() {
    let mut aggregate = AggregateModuleLoader::new();
    aggregate.add_loader(
        "mem",
        Rc::new(InMemoryModuleLoader::new().with_module(ScriptModule::new("answer", "export default 40;"))),
    );
    aggregate.set_fallback(Rc::new(InMemoryModuleLoader::new().with_module(TextModule::new("two", "2"))));

    let context = Runtime::new(RuntimeConfig::default()).unwrap().create_context().unwrap();
    let value = context
        .evaluate_module(
            "import a from 'mem:answer'; import b from 'two'; export default a + Number(b);",
            Some(Rc::new(aggregate)),
        )
        .unwrap();
    assert_eq!(value.as_number().unwrap(), Some(42.0));

    let roots = context.module_records();
    assert_eq!(roots[0].imported_module_names(), vec!["mem:answer", "two"]);
}
