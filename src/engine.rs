use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::iter::Sum;
use std::mem;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

use log::trace;

use crate::error::EngineError;


/// The operation that produced a value. `Input` marks leaves.
///
/// The tag also selects the local derivative applied during backpropagation:
/// `Subtract` nodes are sums and `Negate`/`Divide` nodes are products, since
/// those are the nodes actually built for them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Input,
    Add,
    Subtract,
    Multiply,
    Divide,
    Power(i32),
    Negate,
    ReLU,
}

impl Operation {
    /// Short identifier, safe to use inside DOT node ids.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Input => "input",
            Operation::Add => "add",
            Operation::Subtract => "sub",
            Operation::Multiply => "mul",
            Operation::Divide => "div",
            Operation::Power(_) => "pow",
            Operation::Negate => "neg",
            Operation::ReLU => "relu",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Input => write!(f, ""),
            Operation::Add => write!(f, "+"),
            Operation::Subtract => write!(f, "-"),
            Operation::Multiply => write!(f, "*"),
            Operation::Divide => write!(f, "/"),
            Operation::Power(n) => write!(f, "**{}", n),
            Operation::Negate => write!(f, "neg"),
            Operation::ReLU => write!(f, "ReLU"),
        }
    }
}


struct ValueData {
    data: f64,
    gradient: f64,
    operation: Operation,
    name: Option<String>,
    previous: Vec<Value>,
}

impl ValueData {
    fn new(data: f64, operation: Operation, previous: Vec<Value>) -> ValueData {
        ValueData {
            data,
            gradient: 0.0,
            operation,
            name: None,
            previous,
        }
    }
}

impl Drop for ValueData {
    // Unlinks operands with an explicit stack so that long chains do not
    // overflow the call stack when the last handle goes away.
    fn drop(&mut self) {
        let mut stack = mem::take(&mut self.previous);
        while let Some(Value(node)) = stack.pop() {
            if let Ok(cell) = Rc::try_unwrap(node) {
                stack.append(&mut cell.into_inner().previous);
            }
        }
    }
}


/// Shared handle to a scalar node of the computation graph.
///
/// Cloning a `Value` clones the handle, not the node: every clone sees the
/// same data and accumulates into the same gradient.
#[derive(Clone)]
pub struct Value(Rc<RefCell<ValueData>>);

impl Value {
    pub fn from<T>(t: T) -> Value
    where T: Into<Value> {
        t.into()
    }

    fn new(value: ValueData) -> Value {
        Value(Rc::new(RefCell::new(value)))
    }

    pub fn with_name(self, name: &str) -> Value {
        self.0.borrow_mut().name = Some(name.to_string());
        self
    }

    /// Node identity. Two distinct nodes never share an id while both are alive.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn name(&self) -> Option<String> {
        self.0.borrow().name.clone()
    }

    pub fn operation(&self) -> Operation {
        self.0.borrow().operation
    }

    pub fn data(&self) -> f64 {
        self.0.borrow().data
    }

    pub fn grad(&self) -> f64 {
        self.0.borrow().gradient
    }

    /// The operands this value was computed from, in operand order.
    pub fn previous(&self) -> Vec<Value> {
        self.0.borrow().previous.clone()
    }

    pub fn set_data(&self, data: f64) {
        self.0.borrow_mut().data = data;
    }

    pub fn decrement_data(&self, data: f64) {
        self.0.borrow_mut().data -= data;
    }

    pub fn zero_grad(&self) {
        self.set_gradient(0.0);
    }

    fn set_gradient(&self, gradient: f64) {
        self.0.borrow_mut().gradient = gradient;
    }

    fn increment_gradient(&self, gradient: f64) {
        self.0.borrow_mut().gradient += gradient;
    }

    /// Every value reachable from `self`, each exactly once, with operands
    /// placed before the values computed from them. `self` comes last.
    pub fn topological_order(&self) -> Vec<Value> {
        let mut topo = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(self.clone(), false)];

        while let Some((v, expanded)) = stack.pop() {
            if expanded {
                topo.push(v);
                continue;
            }
            if !visited.insert(v.id()) {
                continue;
            }

            let children = v.previous();
            stack.push((v, true));
            for child in children.into_iter().rev() {
                if !visited.contains(&child.id()) {
                    stack.push((child, false));
                }
            }
        }

        topo
    }

    /// Backpropagates from `self`, seeding its gradient to 1.
    ///
    /// Gradients accumulate: running this twice without zeroing adds the
    /// second pass on top of the first.
    pub fn backward(&self) {
        let topo = self.topological_order();
        trace!("backward over {} nodes", topo.len());

        // Go one variable at a time and apply the chain rule to get its gradient.
        self.set_gradient(1.0);
        for v in topo.iter().rev() {
            v.apply_chain_rule();
        }
    }

    /// Adds this node's local derivative contributions into its operands.
    fn apply_chain_rule(&self) {
        let node = self.0.borrow();
        let out_grad = node.gradient;

        match (node.operation, node.previous.as_slice()) {
            (Operation::Add | Operation::Subtract, [a, b]) => {
                a.increment_gradient(out_grad);
                b.increment_gradient(out_grad);
            }
            (Operation::Multiply | Operation::Negate | Operation::Divide, [a, b]) => {
                let (a_data, b_data) = (a.data(), b.data());
                a.increment_gradient(b_data * out_grad);
                b.increment_gradient(a_data * out_grad);
            }
            (Operation::Power(n), [a]) => {
                let n = f64::from(n);
                let a_data = a.data();
                a.increment_gradient(n * a_data.powf(n - 1.0) * out_grad);
            }
            (Operation::ReLU, [a]) => {
                // Gated on the output, so the kink at zero gets no gradient.
                let gate = if node.data > 0.0 { 1.0 } else { 0.0 };
                a.increment_gradient(gate * out_grad);
            }
            _ => {}
        }
    }

    pub fn powi(&self, exponent: i32) -> Value {
        power(self, exponent)
    }

    /// Like [`Value::powi`], for exponents that arrive as floats.
    ///
    /// Rejects exponents that are not whole numbers representable as `i32`.
    pub fn powf(&self, exponent: f64) -> Result<Value, EngineError> {
        if !exponent.is_finite()
            || exponent.fract() != 0.0
            || exponent < f64::from(i32::MIN)
            || exponent > f64::from(i32::MAX)
        {
            return Err(EngineError::InvalidExponent(exponent));
        }

        Ok(power(self, exponent as i32))
    }

    pub fn relu(&self) -> Value {
        let a = self.data();
        // NaN is not below zero, so it passes through.
        let c = if a < 0.0 { 0.0 } else { a };

        Value::new(ValueData::new(c, Operation::ReLU, vec![self.clone()]))
    }
}

impl<T: Into<f64>> From<T> for Value {
    fn from(t: T) -> Value {
        Value::new(ValueData::new(t.into(), Operation::Input, vec![]))
    }
}

impl Sum for Value {
    fn sum<I: Iterator<Item=Self>>(mut iter: I) -> Self {
        match iter.next() {
            Some(initial) => iter.fold(initial, |acc, x| add(&acc, &x, Operation::Add)),
            None => Value::from(0.0),
        }
    }
}

impl<'a> Sum<&'a Value> for Value {
    fn sum<I: Iterator<Item=&'a Value>>(iter: I) -> Self {
        iter.cloned().sum()
    }
}

fn add(s: &Value, other: &Value, operation: Operation) -> Value {
    let c = s.data() + other.data();

    Value::new(ValueData::new(c, operation, vec![s.clone(), other.clone()]))
}

fn subtract(s: &Value, other: &Value) -> Value {
    add(s, &negate(other), Operation::Subtract)
}

fn multiply(s: &Value, other: &Value, operation: Operation) -> Value {
    let c = s.data() * other.data();

    Value::new(ValueData::new(c, operation, vec![s.clone(), other.clone()]))
}

fn divide(s: &Value, other: &Value) -> Value {
    multiply(s, &other.powi(-1), Operation::Divide)
}

fn power(s: &Value, exponent: i32) -> Value {
    let c = s.data().powf(f64::from(exponent));

    Value::new(ValueData::new(c, Operation::Power(exponent), vec![s.clone()]))
}

fn negate(s: &Value) -> Value {
    multiply(s, &Value::from(-1.0), Operation::Negate)
}

fn add_values(s: &Value, other: &Value) -> Value {
    add(s, other, Operation::Add)
}

fn multiply_values(s: &Value, other: &Value) -> Value {
    multiply(s, other, Operation::Multiply)
}

/// Implements a binary operator for every mix of `Value`, `&Value` and `f64`.
macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $func:ident) => {
        impl $trait<Value> for Value {
            type Output = Value;

            fn $method(self, other: Value) -> Self::Output {
                $func(&self, &other)
            }
        }

        impl $trait<&Value> for Value {
            type Output = Value;

            fn $method(self, other: &Value) -> Self::Output {
                $func(&self, other)
            }
        }

        impl $trait<Value> for &Value {
            type Output = Value;

            fn $method(self, other: Value) -> Self::Output {
                $func(self, &other)
            }
        }

        impl $trait<&Value> for &Value {
            type Output = Value;

            fn $method(self, other: &Value) -> Self::Output {
                $func(self, other)
            }
        }

        impl $trait<f64> for Value {
            type Output = Value;

            fn $method(self, b: f64) -> Self::Output {
                $func(&self, &Value::from(b))
            }
        }

        impl $trait<f64> for &Value {
            type Output = Value;

            fn $method(self, b: f64) -> Self::Output {
                $func(self, &Value::from(b))
            }
        }

        impl $trait<Value> for f64 {
            type Output = Value;

            fn $method(self, other: Value) -> Self::Output {
                $func(&Value::from(self), &other)
            }
        }

        impl $trait<&Value> for f64 {
            type Output = Value;

            fn $method(self, other: &Value) -> Self::Output {
                $func(&Value::from(self), other)
            }
        }
    };
}

impl_binary_op!(Add, add, add_values);
impl_binary_op!(Sub, sub, subtract);
impl_binary_op!(Mul, mul, multiply_values);
impl_binary_op!(Div, div, divide);

impl Neg for Value {
    type Output = Value;

    fn neg(self) -> Self::Output {
        negate(&self)
    }
}

impl Neg for &Value {
    type Output = Value;

    fn neg(self) -> Self::Output {
        negate(self)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("data", &self.data())
            .field("gradient", &self.grad())
            .field("operation", &self.operation())
            .field("name", &self.name())
            .field("previous", &self.previous().iter().map(|x| x.data()).collect::<Vec<f64>>())
            .finish()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value(data={}, grad={})", self.data(), self.grad())
    }
}
