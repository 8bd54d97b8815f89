// Process environment is global; every test that mutates it holds this
// lock for the whole mutate-run-restore span.
#[cfg(test)]
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
pub(crate) fn with_temp_home<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    let _guard = ENV_MUTEX.lock().expect("env lock");
    let dir = tempfile::tempdir().expect("tempdir");
    let old_home = std::env::var("HOME").ok();
    unsafe { std::env::set_var("HOME", dir.path()) };
    let result = func(dir.path());
    match old_home {
        Some(old) => unsafe { std::env::set_var("HOME", old) },
        None => unsafe { std::env::remove_var("HOME") },
    }
    result
}

#[cfg(test)]
pub(crate) fn with_env_var<F, R>(key: &str, value: Option<&str>, func: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().expect("env lock");
    let old = std::env::var(key).ok();
    match value {
        Some(value) => unsafe { std::env::set_var(key, value) },
        None => unsafe { std::env::remove_var(key) },
    }
    let result = func();
    match old {
        Some(old) => unsafe { std::env::set_var(key, old) },
        None => unsafe { std::env::remove_var(key) },
    }
    result
}
