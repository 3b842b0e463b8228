//! Classes, objects, methods and procs.

use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::{Rc, Weak};

use hashbrown::HashMap;

use super::frame::{Context, Env};
use super::value::Value;
use crate::env::ScopeId;
use crate::instructions::BreakPoint;

pub struct Class {
    pub name: String,
    pub superclass: Option<Rc<Class>>,
    pub is_module: bool,
    pub is_singleton: bool,
    /// Enclosing class or module of the definition, for constant lookup.
    pub lexical_parent: Option<Weak<Class>>,
    pub methods: RefCell<HashMap<String, Method>>,
    pub constants: RefCell<HashMap<String, Value>>,
    pub class_vars: RefCell<HashMap<String, Value>>,
    /// Instance variables of the class object itself.
    pub ivars: RefCell<HashMap<String, Value>>,
    /// Included modules, most recent last.
    pub includes: RefCell<Vec<Rc<Class>>>,
    pub singleton: RefCell<Option<Rc<Class>>>,
}

impl Class {
    pub fn new(name: impl Into<String>, superclass: Option<Rc<Class>>) -> Rc<Class> {
        Rc::new(Self::build(name.into(), superclass, false, false, None))
    }

    pub fn module(name: impl Into<String>, lexical_parent: Option<&Rc<Class>>) -> Rc<Class> {
        Rc::new(Self::build(
            name.into(),
            None,
            true,
            false,
            lexical_parent.map(Rc::downgrade),
        ))
    }

    pub fn nested(
        name: impl Into<String>,
        superclass: Option<Rc<Class>>,
        lexical_parent: &Rc<Class>,
    ) -> Rc<Class> {
        Rc::new(Self::build(
            name.into(),
            superclass,
            false,
            false,
            Some(Rc::downgrade(lexical_parent)),
        ))
    }

    fn build(
        name: String,
        superclass: Option<Rc<Class>>,
        is_module: bool,
        is_singleton: bool,
        lexical_parent: Option<Weak<Class>>,
    ) -> Class {
        Class {
            name,
            superclass,
            is_module,
            is_singleton,
            lexical_parent,
            methods: RefCell::new(HashMap::new()),
            constants: RefCell::new(HashMap::new()),
            class_vars: RefCell::new(HashMap::new()),
            ivars: RefCell::new(HashMap::new()),
            includes: RefCell::new(Vec::new()),
            singleton: RefCell::new(None),
        }
    }

    /// Method resolution order: the class, its modules (latest first), then
    /// the superclass chain.
    pub fn ancestors(self: &Rc<Class>) -> Vec<Rc<Class>> {
        let mut out = Vec::new();
        let mut current = Some(self.clone());
        while let Some(class) = current {
            out.push(class.clone());
            for module in class.includes.borrow().iter().rev() {
                for ancestor in module.ancestors() {
                    if !out.iter().any(|seen| Rc::ptr_eq(seen, &ancestor)) {
                        out.push(ancestor);
                    }
                }
            }
            current = class.superclass.clone();
        }
        out
    }

    /// Find `name` along the ancestors; an undefined entry hides the rest.
    pub fn find_method(self: &Rc<Class>, name: &str) -> Option<(Method, Rc<Class>)> {
        for class in self.ancestors() {
            match class.methods.borrow().get(name) {
                Some(Method::Undefined) => return None,
                Some(method) => return Some((method.clone(), class.clone())),
                None => {}
            }
        }
        None
    }

    /// The method `name` would resolve to above `owner` in this class's
    /// ancestors, for `super`.
    pub fn find_super_method(
        self: &Rc<Class>,
        owner: &Rc<Class>,
        name: &str,
    ) -> Option<(Method, Rc<Class>)> {
        let ancestors = self.ancestors();
        let start = ancestors.iter().position(|class| Rc::ptr_eq(class, owner))?;
        for class in &ancestors[start + 1..] {
            match class.methods.borrow().get(name) {
                Some(Method::Undefined) => return None,
                Some(method) => return Some((method.clone(), class.clone())),
                None => {}
            }
        }
        None
    }

    pub fn is_subclass_of(self: &Rc<Class>, other: &Rc<Class>) -> bool {
        self.ancestors().iter().any(|class| Rc::ptr_eq(class, other))
    }

    /// The singleton class, created on first use. Its superclass is the
    /// singleton of this class's superclass, so class methods inherit.
    pub fn singleton_class(self: &Rc<Class>) -> Rc<Class> {
        if let Some(singleton) = self.singleton.borrow().as_ref() {
            return singleton.clone();
        }
        let superclass = self.superclass.as_ref().map(|superclass| superclass.singleton_class());
        let singleton = Rc::new(Self::build(
            format!("#<Class:{}>", self.name),
            superclass,
            false,
            true,
            None,
        ));
        *self.singleton.borrow_mut() = Some(singleton.clone());
        singleton
    }

    pub fn define_method(&self, name: &str, method: Method) {
        self.methods.borrow_mut().insert(name.to_string(), method);
    }

    pub fn lexical_parent(&self) -> Option<Rc<Class>> {
        self.lexical_parent.as_ref().and_then(Weak::upgrade)
    }

    /// Search this class's own constants and then its superclasses'.
    pub fn find_constant(self: &Rc<Class>, name: &str) -> Option<Value> {
        self.ancestors()
            .iter()
            .find_map(|class| class.constants.borrow().get(name).cloned())
    }

    /// The class that owns the class variable `name`, if any.
    pub fn class_var_owner(self: &Rc<Class>, name: &str) -> Option<Rc<Class>> {
        self.ancestors()
            .into_iter()
            .find(|class| class.class_vars.borrow().contains_key(name))
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("is_module", &self.is_module)
            .finish()
    }
}

pub struct Object {
    pub class: Rc<Class>,
    pub ivars: RefCell<HashMap<String, Value>>,
    pub singleton: RefCell<Option<Rc<Class>>>,
    pub frozen: Cell<bool>,
}

impl Object {
    pub fn new(class: Rc<Class>) -> Rc<Object> {
        Rc::new(Object {
            class,
            ivars: RefCell::new(HashMap::new()),
            singleton: RefCell::new(None),
            frozen: Cell::new(false),
        })
    }

    /// The class dispatch starts from: the singleton if one was opened.
    pub fn dispatch_class(&self) -> Rc<Class> {
        match self.singleton.borrow().as_ref() {
            Some(singleton) => singleton.clone(),
            None => self.class.clone(),
        }
    }

    pub fn singleton_class(&self) -> Rc<Class> {
        if let Some(singleton) = self.singleton.borrow().as_ref() {
            return singleton.clone();
        }
        let singleton = Rc::new(Class::build(
            format!("#<Class:#<{}>>", self.class.name),
            Some(self.class.clone()),
            false,
            true,
            None,
        ));
        *self.singleton.borrow_mut() = Some(singleton.clone());
        singleton
    }
}

#[derive(Clone)]
pub enum Method {
    Compiled(Rc<CompiledMethod>),
    AttrReader(Rc<str>),
    AttrWriter(Rc<str>),
    /// `define_method`: a block run with the receiver as `self`.
    Block(Rc<Proc>),
    /// `undef_method`: stops lookup.
    Undefined,
}

/// A method whose body is a region of the program.
pub struct CompiledMethod {
    pub name: String,
    /// Index of the `DefineMethod` opener.
    pub opener: usize,
    pub scope: ScopeId,
    pub arity: i32,
    pub return_point: Option<BreakPoint>,
    /// Lexical class at the definition, for constant lookup.
    pub cref: Rc<Class>,
}

/// A block body closed over the environment it was created in.
pub struct Proc {
    /// Index of the `DefineBlock` opener.
    pub opener: usize,
    pub scope: ScopeId,
    pub arity: i32,
    pub env: Rc<Env>,
    /// What the block inherits from its creating frame.
    pub context: Rc<Context>,
    pub is_lambda: bool,
    pub break_point: Option<BreakPoint>,
    pub return_point: Option<BreakPoint>,
}

impl Proc {
    /// A lambda sharing this block's body and environment.
    pub fn to_lambda(&self, break_point: Option<BreakPoint>, return_point: Option<BreakPoint>) -> Proc {
        Proc {
            opener: self.opener,
            scope: self.scope,
            arity: self.arity,
            env: self.env.clone(),
            context: self.context.clone(),
            is_lambda: true,
            break_point,
            return_point,
        }
    }
}

/// The built-in classes every program starts with.
pub struct CoreClasses {
    pub basic_object: Rc<Class>,
    pub object: Rc<Class>,
    pub module: Rc<Class>,
    pub class: Rc<Class>,
    pub kernel: Rc<Class>,
    pub comparable: Rc<Class>,
    pub nil: Rc<Class>,
    pub true_class: Rc<Class>,
    pub false_class: Rc<Class>,
    pub numeric: Rc<Class>,
    pub integer: Rc<Class>,
    pub float: Rc<Class>,
    pub string: Rc<Class>,
    pub symbol: Rc<Class>,
    pub array: Rc<Class>,
    pub hash: Rc<Class>,
    pub range: Rc<Class>,
    pub regexp: Rc<Class>,
    pub proc_class: Rc<Class>,
    pub exception: Rc<Class>,
    pub standard_error: Rc<Class>,
    pub argument_error: Rc<Class>,
    pub name_error: Rc<Class>,
    pub no_method_error: Rc<Class>,
    pub zero_division_error: Rc<Class>,
    pub type_error: Rc<Class>,
    pub runtime_error: Rc<Class>,
    pub frozen_error: Rc<Class>,
    pub local_jump_error: Rc<Class>,
    pub index_error: Rc<Class>,
    pub range_error: Rc<Class>,
    pub key_error: Rc<Class>,
    pub no_matching_pattern_error: Rc<Class>,
    pub not_implemented_error: Rc<Class>,
}

impl CoreClasses {
    pub fn new() -> Self {
        let basic_object = Class::new("BasicObject", None);
        let object = Class::new("Object", Some(basic_object.clone()));
        let kernel = Class::module("Kernel", None);
        object.includes.borrow_mut().push(kernel.clone());
        let class_in = |name: &str, superclass: &Rc<Class>| Class::new(name, Some(superclass.clone()));

        let module = class_in("Module", &object);
        let class = class_in("Class", &module);
        let comparable = Class::module("Comparable", None);
        let numeric = class_in("Numeric", &object);
        numeric.includes.borrow_mut().push(comparable.clone());
        let string = class_in("String", &object);
        string.includes.borrow_mut().push(comparable.clone());

        let exception = class_in("Exception", &object);
        let script_error = class_in("ScriptError", &exception);
        let standard_error = class_in("StandardError", &exception);
        let name_error = class_in("NameError", &standard_error);
        let runtime_error = class_in("RuntimeError", &standard_error);
        let index_error = class_in("IndexError", &standard_error);

        let core = CoreClasses {
            nil: class_in("NilClass", &object),
            true_class: class_in("TrueClass", &object),
            false_class: class_in("FalseClass", &object),
            integer: class_in("Integer", &numeric),
            float: class_in("Float", &numeric),
            symbol: class_in("Symbol", &object),
            array: class_in("Array", &object),
            hash: class_in("Hash", &object),
            range: class_in("Range", &object),
            regexp: class_in("Regexp", &object),
            proc_class: class_in("Proc", &object),
            argument_error: class_in("ArgumentError", &standard_error),
            no_method_error: class_in("NoMethodError", &name_error),
            zero_division_error: class_in("ZeroDivisionError", &standard_error),
            type_error: class_in("TypeError", &standard_error),
            frozen_error: class_in("FrozenError", &runtime_error),
            local_jump_error: class_in("LocalJumpError", &standard_error),
            key_error: class_in("KeyError", &index_error),
            range_error: class_in("RangeError", &standard_error),
            no_matching_pattern_error: class_in("NoMatchingPatternError", &standard_error),
            not_implemented_error: class_in("NotImplementedError", &script_error),
            basic_object,
            object,
            module,
            class,
            kernel,
            comparable,
            numeric,
            string,
            exception,
            standard_error,
            name_error,
            runtime_error,
            index_error,
        };
        core.register(&script_error);
        core.register_all();
        core
    }

    fn register(&self, class: &Rc<Class>) {
        self.object
            .constants
            .borrow_mut()
            .insert(class.name.clone(), Value::Class(class.clone()));
    }

    fn register_all(&self) {
        for class in [
            &self.basic_object,
            &self.object,
            &self.module,
            &self.class,
            &self.kernel,
            &self.comparable,
            &self.nil,
            &self.true_class,
            &self.false_class,
            &self.numeric,
            &self.integer,
            &self.float,
            &self.string,
            &self.symbol,
            &self.array,
            &self.hash,
            &self.range,
            &self.regexp,
            &self.proc_class,
            &self.exception,
            &self.standard_error,
            &self.argument_error,
            &self.name_error,
            &self.no_method_error,
            &self.zero_division_error,
            &self.type_error,
            &self.runtime_error,
            &self.frozen_error,
            &self.local_jump_error,
            &self.index_error,
            &self.range_error,
            &self.key_error,
            &self.no_matching_pattern_error,
            &self.not_implemented_error,
        ] {
            self.register(class);
        }
    }

    /// The class of any value.
    pub fn class_of(&self, value: &Value) -> Rc<Class> {
        match value {
            Value::Nil => self.nil.clone(),
            Value::Bool(true) => self.true_class.clone(),
            Value::Bool(false) => self.false_class.clone(),
            Value::Int(_) => self.integer.clone(),
            Value::Float(_) => self.float.clone(),
            Value::Symbol(_) => self.symbol.clone(),
            Value::Str(_) => self.string.clone(),
            Value::Array(_) => self.array.clone(),
            Value::Hash(_) => self.hash.clone(),
            Value::Range(_) => self.range.clone(),
            Value::Regexp(_) => self.regexp.clone(),
            Value::Proc(_) => self.proc_class.clone(),
            Value::Object(object) => object.class.clone(),
            Value::Class(class) if class.is_module => self.module.clone(),
            Value::Class(_) => self.class.clone(),
        }
    }

    /// Where method lookup for `value` starts (singletons first).
    pub fn dispatch_class(&self, value: &Value) -> Rc<Class> {
        match value {
            Value::Object(object) => object.dispatch_class(),
            Value::Class(class) => class.singleton_class(),
            other => self.class_of(other),
        }
    }
}

impl Default for CoreClasses {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exception_hierarchy() {
        let core = CoreClasses::new();
        assert!(core.no_method_error.is_subclass_of(&core.name_error));
        assert!(core.zero_division_error.is_subclass_of(&core.standard_error));
        assert!(!core.not_implemented_error.is_subclass_of(&core.standard_error));
        assert!(core.integer.is_subclass_of(&core.comparable));
    }

    #[test]
    fn test_ancestors_include_modules() {
        let core = CoreClasses::new();
        let names: Vec<String> = core
            .integer
            .ancestors()
            .iter()
            .map(|class| class.name.clone())
            .collect();
        assert_eq!(
            names,
            vec!["Integer", "Numeric", "Comparable", "Object", "Kernel", "BasicObject"]
        );
    }

    #[test]
    fn test_undefined_method_hides_ancestors() {
        let base = Class::new("Base", None);
        base.define_method("greet", Method::AttrReader(Rc::from("@greeting")));
        let derived = Class::new("Derived", Some(base.clone()));
        assert!(derived.find_method("greet").is_some());
        derived.define_method("greet", Method::Undefined);
        assert!(derived.find_method("greet").is_none());
    }

    #[test]
    fn test_class_methods_inherit_through_singletons() {
        let base = Class::new("Base", None);
        let derived = Class::new("Derived", Some(base.clone()));
        base.singleton_class()
            .define_method("build", Method::AttrReader(Rc::from("@x")));
        assert!(derived.singleton_class().find_method("build").is_some());
    }
}
