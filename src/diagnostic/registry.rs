/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str,  // one line, shown next to the code
    pub long: &'static str,   // full explanation for --explain
}

/// All stable error codes for kite.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Lexer ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "K-L001",
        short: "unexpected input",
        long: r#"## K-L001: unexpected input

The scanner found text that does not start any kite token.

**Common causes:**
- A string literal without its closing `"`
- An integer literal too large for `int` (add `L` for a long: `10000000000L`)
- `&&` or `||` instead of the keywords `and` / `or`

**Example:**

    let ok = a && b

**Fix:**

    let ok = a and b
"#,
    },

    // ── Parser ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "K-P001",
        short: "unexpected token",
        long: r#"## K-P001: unexpected token

A token was found where a different one was expected. The message names
both. Inside a class body only `let` fields and `fn` methods may appear.

**Example:**

    fn main() {
      let x = (1 + 2
    }
"#,
    },
    ErrorEntry {
        code: "K-P002",
        short: "unexpected end of input",
        long: r#"## K-P002: unexpected end of input

The source ended while a declaration or statement was still open,
usually because of a missing `}` or `)`.
"#,
    },
    ErrorEntry {
        code: "K-P004",
        short: "invalid assignment target",
        long: r#"## K-P004: invalid assignment target

Only variables and fields can be assigned to, with `=` or a compound
operator (`+=`, `-=`, `*=`, `/=`).

**Example:**

    f() = 3
    (a + b) += 1
"#,
    },
    ErrorEntry {
        code: "K-P005",
        short: "undefined variable",
        long: r#"## K-P005: undefined variable

A name was used before any `let`, `fn`, or `class` declared it in an
enclosing scope. Declarations are visible only after the point where
they appear, except that a function may call itself.

When a declared name is close in spelling, the error suggests it.
"#,
    },
    ErrorEntry {
        code: "K-P006",
        short: "unknown type name",
        long: r#"## K-P006: unknown type name

Type annotations accept `int`, `float`, `double`, `long`, `bool`, and
`any`.

**Example:**

    fn f(s: string) { }

**Fix:**

    fn f(s: any) { }
"#,
    },
    ErrorEntry {
        code: "K-P007",
        short: "cannot infer the type of a binding",
        long: r#"## K-P007: cannot infer the type

A `let` needs either a type annotation or an initializer.

**Example:**

    let x

**Fix:**

    let x: int
    let y = 0
"#,
    },
    ErrorEntry {
        code: "K-P008",
        short: "two statements on one line",
        long: r#"## K-P008: two statements on one line

Statements end at a newline. To put several on one line, separate them
with `;`.

**Example:**

    let a = 1 let b = 2

**Fix:**

    let a = 1; let b = 2
"#,
    },
    ErrorEntry {
        code: "K-P009",
        short: "declaration in the wrong place",
        long: r#"## K-P009: declaration in the wrong place

The top level of a program holds only `fn`, `class`, and `let`
declarations. Other statements belong inside a function, usually `main`.
Functions and classes cannot be nested inside other functions.
"#,
    },
    ErrorEntry {
        code: "K-P010",
        short: "too many slots or arguments",
        long: r#"## K-P010: too many slots or arguments

Globals, the locals of one function, and the arguments of one call are
each addressed by a single byte. A program may declare at most 256
globals, a function at most 256 locals, and a call may pass at most 255
arguments.
"#,
    },
    ErrorEntry {
        code: "K-P011",
        short: "'this' outside of a method",
        long: r#"## K-P011: 'this' outside of a method

`this` refers to the instance a method was called on, so it only exists
inside the methods and the constructor of a class.
"#,
    },
    ErrorEntry {
        code: "K-P012",
        short: "duplicate declaration",
        long: r#"## K-P012: duplicate declaration

A name was declared twice in the same scope: two globals, two locals in
one block, two fields, or two methods of one class.
"#,
    },
    ErrorEntry {
        code: "K-P014",
        short: "constructor with a return type",
        long: r#"## K-P014: constructor with a return type

The unnamed `fn(...)` inside a class is its constructor. Calling the
class always produces the new instance, so the constructor cannot
declare a return type.

**Example:**

    class P {
      fn(x: int): int { }
    }
"#,
    },

    // ── Verifier ─────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "K-V001",
        short: "condition is not bool",
        long: r#"## K-V001: condition is not bool

The condition of `if` and `while` must have type `bool`. There is no
implicit truthiness.

**Example:**

    while n { n -= 1 }

**Fix:**

    while n > 0 { n -= 1 }
"#,
    },
    ErrorEntry {
        code: "K-V002",
        short: "operator needs numeric operands",
        long: r#"## K-V002: operator needs numeric operands

Arithmetic (`+ - * /`), ordering comparisons (`< <= > >=`), and unary
`-` work on `int`, `float`, `double`, and `long` only.
"#,
    },
    ErrorEntry {
        code: "K-V003",
        short: "incomparable operands",
        long: r#"## K-V003: incomparable operands

`==` and `!=` compare two numbers or two bools. A number never equals a
bool.

**Example:**

    let same = 1 == true
"#,
    },
    ErrorEntry {
        code: "K-V004",
        short: "logical operator needs bool operands",
        long: r#"## K-V004: logical operator needs bool operands

`and`, `or`, and `!` work on `bool` values only.
"#,
    },
    ErrorEntry {
        code: "K-V005",
        short: "assigned value has the wrong type",
        long: r#"## K-V005: assigned value has the wrong type

A binding keeps the type it was declared with. Assignments, annotated
initializers, and field assignments must supply exactly that type. There
is no implicit conversion between number types here.

**Example:**

    let x = 1
    x = 2.5
"#,
    },
    ErrorEntry {
        code: "K-V006",
        short: "return value from a function without a return type",
        long: r#"## K-V006: return value from a function without a return type

`return expr` is only allowed in a function that declares what it
returns.

**Fix:**

    fn f(): int {
      return 1
    }
"#,
    },
    ErrorEntry {
        code: "K-V007",
        short: "missing return value",
        long: r#"## K-V007: missing return value

A bare `return` was used in a function that declares a return type.
"#,
    },
    ErrorEntry {
        code: "K-V008",
        short: "returned value has the wrong type",
        long: r#"## K-V008: returned value has the wrong type

The value of `return expr` must have the function's declared return
type.
"#,
    },
    ErrorEntry {
        code: "K-V009",
        short: "using the result of a function that returns nothing",
        long: r#"## K-V009: using the result of a function that returns nothing

A function without a return type produces no value, so its call can
only appear as a statement.
"#,
    },

    // ── Code generation ──────────────────────────────────────────────────────
    ErrorEntry {
        code: "K-C001",
        short: "too many constants in one function",
        long: r#"## K-C001: too many constants in one function

Each function has a constant pool addressed by one byte, so it holds at
most 256 distinct literals, names, and nested functions. Split the
function into smaller ones.
"#,
    },
    ErrorEntry {
        code: "K-C002",
        short: "branch too large",
        long: r#"## K-C002: branch too large

A forward jump over the body of an `if`, `else`, `and`, or `or` can
skip at most 32767 bytes of bytecode.
"#,
    },
    ErrorEntry {
        code: "K-C003",
        short: "loop body too large",
        long: r#"## K-C003: loop body too large

The jump back to the start of a `while` loop can cover at most 65535
bytes of bytecode.
"#,
    },
    ErrorEntry {
        code: "K-C004",
        short: "too many call arguments",
        long: r#"## K-C004: too many call arguments

A call instruction encodes its argument count in one byte.
"#,
    },

    // ── Runtime ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "K-R001",
        short: "expected a number",
        long: r#"## K-R001: expected a number

An arithmetic or comparison instruction received a value that is not a
number. Values typed `any` are only checked at run time, so this can
happen even after verification passed.
"#,
    },
    ErrorEntry {
        code: "K-R002",
        short: "expected a bool",
        long: r#"## K-R002: expected a bool

A branch or `!` received a value that is not a bool.
"#,
    },
    ErrorEntry {
        code: "K-R003",
        short: "integer division by zero",
        long: r#"## K-R003: integer division by zero

Dividing an `int` or `long` by zero is a fatal error. Floating-point
division by zero yields infinity or NaN instead.
"#,
    },
    ErrorEntry {
        code: "K-R004",
        short: "field access on a non-instance",
        long: r#"## K-R004: field access on a non-instance

`a.b`, `a.b = v`, and `a.m()` need `a` to be a class instance.

**Example:**

    let n = 3
    : n.size
"#,
    },
    ErrorEntry {
        code: "K-R005",
        short: "undefined field",
        long: r#"## K-R005: undefined field

The instance has no field or method with this name. Fields exist once
they are declared with `let` in the class body or assigned through the
instance.
"#,
    },
    ErrorEntry {
        code: "K-R006",
        short: "value is not callable",
        long: r#"## K-R006: value is not callable

Only functions and classes can be called.
"#,
    },
    ErrorEntry {
        code: "K-R007",
        short: "class has no constructor",
        long: r#"## K-R007: class has no constructor

The called class carries no constructor. Classes compiled from source
always get one, so this points at hand-built bytecode.
"#,
    },
    ErrorEntry {
        code: "K-R008",
        short: "wrong number of arguments",
        long: r#"## K-R008: wrong number of arguments

A function or constructor was called with a different number of
arguments than it declares.
"#,
    },
    ErrorEntry {
        code: "K-R009",
        short: "argument has the wrong type",
        long: r#"## K-R009: argument has the wrong type

Parameter types are checked when a call enters a function. A parameter
typed `any` accepts every value; any other parameter requires a value of
exactly that type, with no numeric widening.

**Example:**

    fn f(a: int) { }
    fn main() {
      f(1.5)
    }
"#,
    },
    ErrorEntry {
        code: "K-R010",
        short: "stack overflow",
        long: r#"## K-R010: stack overflow

The call depth went past the frame limit (64 by default, see
`--max-frames`). This usually means unbounded recursion.
"#,
    },
    ErrorEntry {
        code: "K-R011",
        short: "method called without an instance",
        long: r#"## K-R011: method called without an instance

A method value was called directly instead of through an instance, so
there was no `this` to bind.
"#,
    },
    ErrorEntry {
        code: "K-R012",
        short: "operand stack out of balance",
        long: r#"## K-R012: operand stack out of balance

An instruction popped from an empty operand stack, or a function
returned with values left on it. This indicates a compiler bug, not a
user error.
"#,
    },
    ErrorEntry {
        code: "K-R013",
        short: "read of an unassigned slot",
        long: r#"## K-R013: read of an unassigned slot

A register or global was read before anything stored to it. Compiled
programs initialise every binding, so this indicates a compiler bug or
hand-built bytecode.
"#,
    },
    ErrorEntry {
        code: "K-R014",
        short: "malformed bytecode",
        long: r#"## K-R014: malformed bytecode

The VM met an unknown opcode, a bad constant index, a jump outside the
chunk, or ran off the end of the code. This indicates a compiler bug,
not a user error.
"#,
    },
    ErrorEntry {
        code: "K-R015",
        short: "result of a function that returns nothing",
        long: r#"## K-R015: result of a function that returns nothing

A method with no return type was called where a value is needed. Method
calls are not type-checked statically, so this is caught when the
method returns.

**Example:**

    class C {
      fn m() { }
    }
    fn main() {
      let c = C()
      : c.m()
    }

**Fix:** give the method a return type and return a value, or call it as
a statement.
"#,
    },
];

/// Look up an error entry by code (e.g. `"K-V001"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_code() {
        let e = lookup("K-R009").expect("K-R009 should be in registry");
        assert_eq!(e.code, "K-R009");
        assert!(!e.short.is_empty());
        assert!(e.long.contains("K-R009"));
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(lookup("k-v001").map(|e| e.code), Some("K-V001"));
    }

    #[test]
    fn lookup_unknown_returns_none() {
        assert!(lookup("K-X999").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn all_codes_unique() {
        let mut codes: Vec<&str> = REGISTRY.iter().map(|e| e.code).collect();
        codes.sort_unstable();
        let len_before = codes.len();
        codes.dedup();
        assert_eq!(codes.len(), len_before, "duplicate codes in registry");
    }

    #[test]
    fn every_long_text_starts_with_its_code() {
        for entry in REGISTRY {
            assert!(!entry.short.is_empty(), "{} missing short description", entry.code);
            assert!(entry.long.starts_with(&format!("## {}:", entry.code)), "{}", entry.code);
        }
    }
}
