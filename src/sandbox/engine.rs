use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::interpreter::{Interpreter, Interrupt};
use super::parser::parse_script;
use super::transcript::{DiagnosticSink, Outcome, Transcript};
use super::value::Val;

/// Evaluations run on their own thread so deep script recursion is bounded by
/// the call depth limit rather than by the caller's stack.
const SANDBOX_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Bounds applied to every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Statements, loop iterations and calls allowed before the run is cut off.
    pub max_steps: u64,
    /// Wall-clock budget of one run.
    pub timeout: Duration,
    /// Nested script calls allowed before a `RangeError` is thrown.
    pub max_call_depth: usize,
}

impl ExecutionLimits {
    pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);
    pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps: Self::DEFAULT_MAX_STEPS,
            timeout: Self::DEFAULT_TIMEOUT,
            max_call_depth: Self::DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Runs scripts against a captured console. Each run starts from a fresh
/// global scope and never reports a failure other than through its
/// [`Transcript`].
#[derive(Debug, Clone, Default)]
pub struct Engine {
    limits: ExecutionLimits,
}

impl Engine {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    pub fn run(&self, source: &str) -> Transcript {
        let limits = self.limits;
        let evaluation = thread::scope(|scope| {
            thread::Builder::new()
                .name("sandbox".to_string())
                .stack_size(SANDBOX_STACK_SIZE)
                .spawn_scoped(scope, move || evaluate(source, limits))
                .map(|handle| handle.join())
        });

        match evaluation {
            Ok(Ok(transcript)) => transcript,
            Ok(Err(_)) => {
                error!("Sandbox evaluation panicked");
                internal_failure("Evaluation aborted unexpectedly")
            }
            Err(e) => {
                error!("Failed to start sandbox thread: {}", e);
                internal_failure("Evaluation could not be started")
            }
        }
    }
}

fn internal_failure(message: &str) -> Transcript {
    let mut sink = DiagnosticSink::default();
    sink.error(message);
    Transcript::new(sink.into_lines(), Outcome::Faulted)
}

fn evaluate(source: &str, limits: ExecutionLimits) -> Transcript {
    let program = match parse_script(source) {
        Ok(program) => program,
        Err(e) => {
            debug!("Script rejected before evaluation: {}", e);
            return Transcript::compile_failed(e);
        }
    };

    let mut interpreter = Interpreter::new(limits);
    let result = interpreter.run(&program);
    let steps = interpreter.steps();
    let mut sink = interpreter.into_sink();

    let outcome = match result {
        Ok(()) => Outcome::Completed,
        Err(Interrupt::Throw(thrown)) => {
            sink.error(fault_message(&thrown));
            Outcome::Faulted
        }
        Err(Interrupt::Exhausted(reason)) => {
            warn!("Script stopped after {} steps: {}", steps, reason);
            sink.error(format!("Execution timed out ({reason})"));
            Outcome::TimedOut
        }
    };

    debug!("Script {} after {} steps", outcome, steps);
    Transcript::new(sink.into_lines(), outcome)
}

/// `fault.message` converted to a string.
fn fault_message(thrown: &Val) -> String {
    match thrown {
        Val::Error(error) => error.message.clone(),
        Val::Object(properties) => properties
            .borrow()
            .get("message")
            .map_or_else(|| "undefined".to_string(), Val::to_js_string),
        _ => "undefined".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn run(source: &str) -> Transcript {
        Engine::default().run(source)
    }

    #[test]
    fn logs_a_single_line() {
        let transcript = run("console.log('hi')");
        assert_eq!(transcript.to_string(), "hi");
        assert_eq!(transcript.outcome(), Outcome::Completed);
    }

    #[test]
    fn one_line_per_console_call() {
        let transcript = run("console.log(1); console.warn('w'); console.error('e', 2)");
        assert_eq!(transcript.to_string(), "1\nWarning: w\nError: e 2");
    }

    #[test]
    fn empty_source_produces_empty_transcript() {
        let transcript = run("");
        assert_eq!(transcript.to_string(), "");
        assert!(transcript.is_success());
    }

    #[test]
    fn fault_keeps_earlier_output() {
        let transcript = run("console.log('before'); throw new Error('boom'); console.log('after')");
        assert_eq!(transcript.to_string(), "before\nError: boom");
        assert_eq!(transcript.outcome(), Outcome::Faulted);
    }

    #[test]
    fn thrown_value_without_message_reports_undefined() {
        assert_eq!(run("throw 'boom'").to_string(), "Error: undefined");
        assert_eq!(
            run("throw { message: 'custom' }").to_string(),
            "Error: custom"
        );
    }

    #[test]
    fn unparseable_source_is_one_error_line() {
        let transcript = run("console.log(");
        assert_eq!(transcript.lines().len(), 1);
        assert!(transcript.to_string().starts_with("Error: "));
        assert_eq!(transcript.outcome(), Outcome::CompileFailed);
    }

    #[rstest]
    #[case("console.log('x') console.log('y')")]
    #[case("let a = 1 2")]
    #[case("console.log('x'); class A {}")]
    fn statements_need_a_separator(#[case] source: &str) {
        let transcript = run(source);
        assert_eq!(transcript.outcome(), Outcome::CompileFailed);
        assert_eq!(transcript.lines().len(), 1);
    }

    #[test]
    fn compile_errors_prevent_any_output() {
        let transcript = run("console.log('never'); let a = 1; let a = 2");
        assert_eq!(
            transcript.to_string(),
            "Error: Identifier 'a' has already been declared"
        );
    }

    #[test]
    fn endless_loop_times_out_on_steps() {
        let engine = Engine::new(ExecutionLimits {
            max_steps: 10_000,
            ..ExecutionLimits::default()
        });
        let transcript = engine.run("console.log('start'); while (true) {}");
        assert_eq!(transcript.outcome(), Outcome::TimedOut);
        let texts: Vec<_> = transcript.texts().collect();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0], "start");
        assert!(texts[1].starts_with("Error: Execution timed out"));
    }

    #[test]
    fn endless_loop_times_out_on_deadline() {
        let engine = Engine::new(ExecutionLimits {
            max_steps: u64::MAX,
            timeout: Duration::ZERO,
            ..ExecutionLimits::default()
        });
        let transcript = engine.run("for (;;) {}");
        assert_eq!(transcript.outcome(), Outcome::TimedOut);
    }

    #[test]
    fn runaway_recursion_is_a_catchable_fault() {
        let transcript = run("function f() { return f() } f()");
        assert_eq!(
            transcript.to_string(),
            "Error: Maximum call stack size exceeded"
        );

        let transcript = run(
            "function f() { return f() } try { f() } catch (e) { console.log(e.name) }",
        );
        assert_eq!(transcript.to_string(), "RangeError");
        assert!(transcript.is_success());
    }

    #[test]
    fn deeply_nested_values_fault_instead_of_overflowing() {
        let engine = Engine::new(ExecutionLimits {
            timeout: Duration::from_secs(60),
            ..ExecutionLimits::default()
        });
        let transcript = engine.run(
            "let a = []; for (let i = 0; i < 150000; i++) a = [a]; console.log('built'); console.log(a)",
        );
        assert_eq!(
            transcript.to_string(),
            "built\nError: Maximum call stack size exceeded"
        );
        assert_eq!(transcript.outcome(), Outcome::Faulted);

        let transcript = engine.run(
            "let a = []; for (let i = 0; i < 5000; i++) a = [a]; try { JSON.stringify(a) } catch (e) { console.log(e.name) } a = null",
        );
        assert_eq!(transcript.to_string(), "RangeError");
    }

    #[test]
    fn scheduled_callbacks_never_run() {
        let transcript = run(
            "setTimeout(() => console.log('later'), 0); setInterval(() => console.log('tick'), 10); console.log('now')",
        );
        assert_eq!(transcript.to_string(), "now");
    }

    #[test]
    fn each_run_starts_from_fresh_globals() {
        let engine = Engine::default();
        engine.run("var leaked = 1; console = null");
        let transcript = engine.run("console.log(typeof leaked)");
        assert_eq!(transcript.to_string(), "undefined");
    }

    #[rstest]
    #[case("console.log(1 + 2, 'a' + 1, 7 / 2, 7 % 3)", "3 a1 3.5 1")]
    #[case("console.log([1, 'a', null], { a: 1, b: [true] })", r#"[1,"a",null] {"a":1,"b":[true]}"#)]
    #[case("console.log(null, undefined, true)", "null undefined true")]
    #[case("console.error(null, undefined, [1, 2])", "Error:   1,2")]
    #[case("let s = 0; for (let i = 0; i < 5; i++) { if (i === 3) continue; s += i } console.log(s)", "7")]
    #[case("let i = 0; while (true) { if (++i > 4) break } console.log(i)", "5")]
    #[case("const fns = []; for (let i = 0; i < 3; i++) fns.push(() => i); console.log(fns.map(f => f()).join(','))", "0,1,2")]
    #[case("let out = ''; for (const c of 'abc') out = c + out; console.log(out)", "cba")]
    #[case("function counter() { let n = 0; return () => ++n } const c = counter(); c(); console.log(c())", "2")]
    #[case("const o = { a: 1 }; o.b = 2; o['c'] = o.a + o.b; console.log(Object.keys(o).join(), Object.values(o).join())", "a,b,c 1,2,3")]
    #[case("const a = [3, 1, 2]; a[5] = 9; console.log(a.length, a.indexOf(9), a.includes(4))", "6 5 false")]
    #[case("console.log([1, 2, 3, 4].filter(n => n % 2 === 0).map(n => n * 10).reduce((a, b) => a + b, 0))", "60")]
    #[case("console.log([1, 2, 3].slice(-2).join('-'), [1, 2].pop())", "2-3 2")]
    #[case("console.log(' Hi '.trim().toUpperCase(), 'a,b'.split(','), 'abc'.slice(1))", r#"HI ["a","b"] bc"#)]
    #[case("console.log('hello'.indexOf('l'), 'ab'.repeat(2), 'abc'.startsWith('ab'), 'abc'.endsWith('x'))", "2 abab true false")]
    #[case("console.log((3.14159).toFixed(2), (255).toString(16), Math.max(1, 5, 3), Math.round(2.5))", "3.14 ff 5 3")]
    #[case("console.log((2.5).toFixed(0), (1.25).toFixed(1), (0.5).toFixed(0), (1.005).toFixed(2))", "3 1.3 1 1.00")]
    #[case("console.log(JSON.stringify({ a: [1, 2] }, null, 2))", "{\n  \"a\": [\n    1,\n    2\n  ]\n}")]
    #[case("const v = JSON.parse('{\"x\": [1, {\"y\": null}]}'); console.log(v.x[1].y === null, v.x.length)", "true 2")]
    #[case("console.log(typeof 1, typeof 'a', typeof null, typeof undefined, typeof console.log, typeof missing)", "number string object undefined function undefined")]
    #[case("console.log(1 == '1', 1 === '1', null == undefined, null ?? 'd', 0 || 'e', 1 && 'f')", "true false true d e f")]
    #[case("console.log(`sum: ${1 + 2}!`)", "sum: 3!")]
    #[case("console.log(String([1, [2, 3]]), Number('12'), parseInt('42px'), parseFloat('1.5e2'), isNaN('x'))", "1,2,3 12 42 150 true")]
    #[case("try { null.x } catch (e) { console.log(e.message) }", "Cannot read properties of null (reading 'x')")]
    #[case("try { throw new TypeError('bad') } catch (e) { console.log(e.name, e.message) } finally { console.log('done') }", "TypeError bad\ndone")]
    #[case("function f() { try { return 'try' } finally { console.log('cleanup') } } console.log(f())", "cleanup\ntry")]
    #[case("console.log(Array.isArray([]), Array.isArray('a'), Math.floor(-1.5), Math.abs(-3))", "true false -2 3")]
    #[case("const e = new Error('oops'); console.log(e, String(e))", "{} Error: oops")]
    #[case("console.log('top'); return; console.log('unreachable')", "top")]
    fn evaluates_scripts(#[case] source: &str, #[case] expected: &str) {
        let transcript = run(source);
        assert_eq!(transcript.to_string(), expected, "source: {source}");
        assert!(transcript.is_success());
    }

    #[rstest]
    #[case("missing + 1", "Error: missing is not defined")]
    #[case("const x = 1; x = 2", "Error: Assignment to constant variable.")]
    #[case("const o = {}; o.run()", "Error: o.run is not a function")]
    #[case("let u; u.y", "Error: Cannot read properties of undefined (reading 'y')")]
    #[case("[].reduce((a, b) => a + b)", "Error: Reduce of empty array with no initial value")]
    #[case("const a = []; a.push(a); JSON.stringify(a)", "Error: Converting circular structure to JSON")]
    #[case("const n = 5; for (const x of n) {}", "Error: n is not iterable")]
    #[case("for (const x of 5) {}", "Error: 5 is not iterable")]
    #[case("[3, 1, 10].sort()", "Error: (intermediate value).sort is not a function")]
    #[case("({ a: 1 }).a()", "Error: (intermediate value).a is not a function")]
    #[case("'abc'.shout()", "Error: \"abc\".shout is not a function")]
    #[case("const f = () => ({}); f().run()", "Error: f(...).run is not a function")]
    fn reports_faults(#[case] source: &str, #[case] expected: &str) {
        let transcript = run(source);
        assert_eq!(transcript.to_string(), expected);
        assert_eq!(transcript.outcome(), Outcome::Faulted);
    }
}
