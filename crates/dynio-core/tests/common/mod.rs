//! In-process fake modules.
//!
//! Each fake wraps the csv driver's real entry points and records what the
//! loader does with it. Events are kept per thread so tests running in
//! parallel do not see each other.

#![allow(dead_code)]

use std::cell::RefCell;
use std::ffi::{c_char, c_void};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dynio_core::{BoxError, DriverLoader, LoaderConfig, Module, ModuleOpener, ModuleRegistry};
use dynio_sdk::abi::{DeregisterFn, OptionFn, RegisterFn};
use dynio_sdk::{DriverDescriptor, RawOption, DEREGISTER_SYMBOL, REGISTER_SYMBOL};
use once_cell::sync::OnceCell;

thread_local! {
    static EVENTS: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
}

fn record(event: &'static str) {
    EVENTS.with(|events| events.borrow_mut().push(event));
}

/// Events recorded on this thread since the last call.
pub fn take_events() -> Vec<&'static str> {
    EVENTS.with(|events| std::mem::take(&mut *events.borrow_mut()))
}

/// What a fake module exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// The csv driver, unchanged.
    Csv,
    NoRegister,
    NoDeregister,
    /// Constructor leaves the descriptor null.
    NullDescriptor,
    /// Descriptor without a decode slot.
    MissingDecode,
    /// Option lookup answers every name with the delimiter option.
    AliasedOption,
}

impl Flavor {
    fn from_path(path: &Path) -> Option<Self> {
        match path.file_name()?.to_str()? {
            "csv.so" => Some(Flavor::Csv),
            "no-register.so" => Some(Flavor::NoRegister),
            "no-deregister.so" => Some(Flavor::NoDeregister),
            "null-descriptor.so" => Some(Flavor::NullDescriptor),
            "missing-decode.so" => Some(Flavor::MissingDecode),
            "aliased-option.so" => Some(Flavor::AliasedOption),
            _ => None,
        }
    }
}

unsafe extern "C" fn csv_register(out: *mut *mut DriverDescriptor) {
    record("register");
    unsafe { dynio_csv::register_driver(out) }
}

unsafe extern "C" fn csv_deregister(inout: *mut *mut DriverDescriptor) {
    record("deregister");
    unsafe { dynio_csv::deregister_driver(inout) }
}

unsafe extern "C" fn null_register(out: *mut *mut DriverDescriptor) {
    record("register");
    unsafe { out.write(ptr::null_mut()) }
}

unsafe extern "C" fn missing_decode_register(out: *mut *mut DriverDescriptor) {
    unsafe {
        csv_register(out);
        (**out).decode = None;
    }
}

static CSV_OPTION: OnceCell<OptionFn> = OnceCell::new();

unsafe extern "C" fn aliased_option(
    this: *mut DriverDescriptor,
    _name: *const c_char,
) -> *mut RawOption {
    match CSV_OPTION.get() {
        Some(option) => unsafe { option(this, c"delimiter".as_ptr()) },
        None => ptr::null_mut(),
    }
}

unsafe extern "C" fn aliased_option_register(out: *mut *mut DriverDescriptor) {
    unsafe {
        csv_register(out);
        if let Some(option) = (**out).option {
            let _ = CSV_OPTION.set(option);
        }
        (**out).option = Some(aliased_option);
    }
}

fn address(f: RegisterFn) -> NonNull<c_void> {
    NonNull::new(f as *mut c_void).expect("function pointers are non-null")
}

pub struct FakeModule {
    path: PathBuf,
    flavor: Flavor,
}

impl Module for FakeModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol_address(&self, symbol: &str) -> Result<NonNull<c_void>, BoxError> {
        let register: Option<RegisterFn> = match self.flavor {
            Flavor::Csv | Flavor::NoDeregister => Some(csv_register),
            Flavor::NullDescriptor => Some(null_register),
            Flavor::MissingDecode => Some(missing_decode_register),
            Flavor::AliasedOption => Some(aliased_option_register),
            Flavor::NoRegister => None,
        };
        let deregister: Option<DeregisterFn> = match self.flavor {
            Flavor::NoDeregister => None,
            _ => Some(csv_deregister),
        };

        let found = match symbol {
            REGISTER_SYMBOL => register,
            DEREGISTER_SYMBOL => deregister,
            _ => None,
        };
        found
            .map(address)
            .ok_or_else(|| format!("{}: undefined symbol: {}", self.path.display(), symbol).into())
    }
}

impl Drop for FakeModule {
    fn drop(&mut self) {
        record("close");
    }
}

/// Opens fake modules by file name and counts successful opens.
#[derive(Default)]
pub struct FakeOpener {
    pub opened: Arc<AtomicUsize>,
}

impl FakeOpener {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl ModuleOpener for FakeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn Module>, BoxError> {
        let flavor = Flavor::from_path(path).ok_or_else(|| {
            format!("{}: cannot open shared object file: No such file or directory", path.display())
        })?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeModule {
            path: path.to_path_buf(),
            flavor,
        }))
    }
}

/// A loader over fake modules with its own registry.
pub fn fake_loader(config: LoaderConfig) -> (DriverLoader, Arc<FakeOpener>) {
    let opener = Arc::new(FakeOpener::default());
    let loader = DriverLoader::with_config(config)
        .with_registry(Arc::new(ModuleRegistry::new()))
        .with_opener(opener.clone());
    take_events();
    (loader, opener)
}
