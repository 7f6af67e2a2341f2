// Copyright 2026 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Sandboxed Lua validation of HTTP check responses.
//!
//! Operators attach small scripts to HTTP(S) checks; a script sees the
//! globals `status_code`, `body` and `headers` and returns a truthy value
//! to signal a healthy response. Scripts run inside a restricted
//! environment: only the string/math/table stdlib is open, the chunk
//! environment is the sandbox table from the operator-provided config
//! file, and execution is cut off after [SCRIPT_DEADLINE].

use std::time::{Duration, Instant};

use mlua::{Function, HookTriggers, Lua, LuaOptions, StdLib, Table, Value, VmState};

/// Hard deadline for a single script execution.
pub const SCRIPT_DEADLINE: Duration = Duration::from_millis(150);

/// Instruction granularity of the deadline hook.
const HOOK_INSTRUCTION_COUNT: u32 = 1024;

const DEADLINE_MARKER: &str = "script deadline exceeded";

/// Errors produced by script validation.
///
/// These never propagate past validation; a failing script simply fails the
/// health check.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The sandbox configuration file could not be loaded.
    #[error("could not load sandbox configuration: {0}")]
    Sandbox(String),

    /// The user script does not compile.
    #[error("could not compile validation script: {0}")]
    Compile(#[source] mlua::Error),

    /// The user script raised an error at runtime.
    #[error("validation script failed: {0}")]
    Execution(#[source] mlua::Error),

    /// The script ran past [SCRIPT_DEADLINE].
    #[error("validation script exceeded the {SCRIPT_DEADLINE:?} deadline")]
    Deadline,

    /// The script returned `nil` or `false`.
    #[error("validation script rejected the response")]
    Rejected,

    /// The VM pool was shut down.
    #[error("lua vm pool is closed")]
    PoolClosed,
}

/// A bounded pool of sandboxed Lua VMs.
///
/// VMs are created up front, one per available core, each with the sandbox
/// environment table installed. Checking out a VM is an await on the pool
/// channel, so validation backpressure is bounded by the VM count.
pub struct LuaPool {
    vms: (flume::Sender<Lua>, flume::Receiver<Lua>),
}

impl LuaPool {
    /// Builds a pool whose sandbox environment is defined by `source`, a
    /// Lua chunk that must leave a global table named `sandbox` behind.
    pub fn new(source: &str) -> Result<Self, ScriptError> {
        let size = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let (tx, rx) = flume::bounded(size);
        for _ in 0..size {
            let vm = Self::new_vm(source)?;
            tx.try_send(vm).expect("pool channel sized to vm count");
        }

        Ok(Self { vms: (tx, rx) })
    }

    /// Builds a pool from the sandbox configuration file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ScriptError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| ScriptError::Sandbox(format!("{}: {e}", path.display())))?;
        Self::new(&source)
    }

    fn new_vm(source: &str) -> Result<Lua, ScriptError> {
        // No io/os/debug/package: scripts must not touch the filesystem,
        // spawn processes, or reach the network.
        let lua = Lua::new_with(
            StdLib::STRING | StdLib::MATH | StdLib::TABLE,
            LuaOptions::default(),
        )
        .map_err(|e| ScriptError::Sandbox(e.to_string()))?;

        lua.load(source)
            .exec()
            .map_err(|e| ScriptError::Sandbox(e.to_string()))?;

        let sandbox: Value = lua
            .globals()
            .get("sandbox")
            .map_err(|e| ScriptError::Sandbox(e.to_string()))?;
        if !matches!(sandbox, Value::Table(_)) {
            return Err(ScriptError::Sandbox(
                "sandbox configuration must define a global table named `sandbox`".to_string(),
            ));
        }

        Ok(lua)
    }

    async fn get(&self) -> Result<Lua, ScriptError> {
        self.vms.1.recv_async().await.map_err(|_| ScriptError::PoolClosed)
    }

    async fn put(&self, vm: Lua) {
        // Only fails when the pool is shutting down, in which case the VM
        // is simply dropped.
        let _ = self.vms.0.send_async(vm).await;
    }
}

impl std::fmt::Debug for LuaPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaPool")
            .field("capacity", &self.vms.0.capacity())
            .finish()
    }
}

/// A compiled validation script bound to a VM pool.
pub struct LuaValidator {
    pool: std::sync::Arc<LuaPool>,
    script: String,
    // Compiled chunks are cached per VM under this registry key.
    registry_key: String,
}

impl LuaValidator {
    /// Creates a validator for `script`.
    pub fn new(pool: std::sync::Arc<LuaPool>, script: impl Into<String>) -> Self {
        let script = script.into();
        let registry_key = format!("gslb.script.{:016x}", fxhash(&script));
        Self {
            pool,
            script,
            registry_key,
        }
    }

    /// The raw script source.
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Runs the script against one HTTP response.
    pub async fn validate(
        &self,
        status_code: u16,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<(), ScriptError> {
        let vm = self.pool.get().await?;
        let result = self.validate_on(&vm, status_code, headers, body);
        self.pool.put(vm).await;
        result
    }

    fn validate_on(
        &self,
        lua: &Lua,
        status_code: u16,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<(), ScriptError> {
        let sandbox: Table = lua
            .globals()
            .get("sandbox")
            .map_err(ScriptError::Execution)?;

        let compiled = self.compiled(lua, &sandbox)?;

        let header_table = lua.create_table().map_err(ScriptError::Execution)?;
        for (name, value) in headers {
            header_table
                .set(name.as_str(), value.as_str())
                .map_err(ScriptError::Execution)?;
        }

        sandbox
            .set("status_code", status_code)
            .map_err(ScriptError::Execution)?;
        sandbox.set("body", body).map_err(ScriptError::Execution)?;
        sandbox
            .set("headers", header_table)
            .map_err(ScriptError::Execution)?;

        let deadline = Instant::now() + SCRIPT_DEADLINE;
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(HOOK_INSTRUCTION_COUNT),
            move |_lua, _debug| {
                if Instant::now() >= deadline {
                    return Err(mlua::Error::runtime(DEADLINE_MARKER));
                }
                Ok(VmState::Continue)
            },
        );

        let outcome: Result<Value, mlua::Error> = compiled.call(());

        lua.remove_hook();
        for key in ["status_code", "body", "headers"] {
            let _ = sandbox.set(key, Value::Nil);
        }

        match outcome {
            Ok(Value::Nil) | Ok(Value::Boolean(false)) => Err(ScriptError::Rejected),
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains(DEADLINE_MARKER) => Err(ScriptError::Deadline),
            Err(e) => Err(ScriptError::Execution(e)),
        }
    }

    /// Fetches the compiled chunk from the VM registry, compiling and
    /// caching it on first use.
    fn compiled(&self, lua: &Lua, sandbox: &Table) -> Result<Function, ScriptError> {
        if let Ok(func) = lua.named_registry_value::<Function>(&self.registry_key) {
            return Ok(func);
        }

        let func = lua
            .load(self.script.as_str())
            .set_environment(sandbox.clone())
            .into_function()
            .map_err(ScriptError::Compile)?;

        lua.set_named_registry_value(&self.registry_key, func.clone())
            .map_err(ScriptError::Execution)?;
        Ok(func)
    }
}

impl std::fmt::Debug for LuaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaValidator")
            .field("script", &self.script)
            .finish_non_exhaustive()
    }
}

fn fxhash(s: &str) -> u64 {
    // Small stable string hash for registry keys; collisions only cost a
    // recompile against the wrong cache slot, never correctness, because
    // keys embed the full 64-bit value and scripts are per-validator.
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in s.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// The sandbox used when no operator configuration is supplied: an empty
/// environment, which still exposes the per-check globals.
pub const DEFAULT_SANDBOX: &str = "sandbox = {}";

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn pool() -> Arc<LuaPool> {
        Arc::new(LuaPool::new(DEFAULT_SANDBOX).unwrap())
    }

    fn headers() -> Vec<(String, String)> {
        vec![("content-type".to_string(), "text/plain".to_string())]
    }

    #[tokio::test]
    async fn truthy_return_is_healthy() {
        let validator = LuaValidator::new(pool(), "return status_code ~= 503");
        validator.validate(200, &headers(), "ok").await.unwrap();
    }

    #[tokio::test]
    async fn falsy_return_is_rejected() {
        let validator = LuaValidator::new(pool(), "return status_code == 200");
        let err = validator.validate(500, &headers(), "").await.unwrap_err();
        assert!(matches!(err, ScriptError::Rejected));
    }

    #[tokio::test]
    async fn nil_return_is_rejected() {
        let validator = LuaValidator::new(pool(), "return nil");
        let err = validator.validate(200, &headers(), "").await.unwrap_err();
        assert!(matches!(err, ScriptError::Rejected));
    }

    #[tokio::test]
    async fn script_reads_body_and_headers() {
        let validator = LuaValidator::new(
            pool(),
            r#"return body == "ready" and headers["content-type"] == "text/plain""#,
        );
        validator.validate(200, &headers(), "ready").await.unwrap();
    }

    #[tokio::test]
    async fn runtime_error_is_captured() {
        let validator = LuaValidator::new(pool(), "error('boom')");
        let err = validator.validate(200, &headers(), "").await.unwrap_err();
        assert!(matches!(err, ScriptError::Execution(_)));
    }

    #[tokio::test]
    async fn compile_error_is_captured() {
        let validator = LuaValidator::new(pool(), "return ~~~");
        let err = validator.validate(200, &headers(), "").await.unwrap_err();
        assert!(matches!(err, ScriptError::Compile(_)));
    }

    #[tokio::test]
    async fn runaway_script_hits_deadline() {
        let validator = LuaValidator::new(pool(), "while true do end");
        let err = validator.validate(200, &headers(), "").await.unwrap_err();
        assert!(matches!(err, ScriptError::Deadline));
    }

    #[tokio::test]
    async fn sandbox_hides_dangerous_globals() {
        let validator = LuaValidator::new(pool(), "return os ~= nil or io ~= nil");
        let err = validator.validate(200, &headers(), "").await.unwrap_err();
        assert!(matches!(err, ScriptError::Rejected));
    }

    #[tokio::test]
    async fn globals_are_cleared_between_calls() {
        let p = pool();
        let writer = LuaValidator::new(p.clone(), "return body");
        writer.validate(200, &headers(), "payload").await.unwrap();

        // A later call must not observe the previous body.
        let reader = LuaValidator::new(p, "return body == nil");
        // `body` for this call is the empty string, not the stale payload.
        let err = reader.validate(200, &headers(), "").await.unwrap_err();
        assert!(matches!(err, ScriptError::Rejected));
    }

    #[test]
    fn sandbox_config_must_define_table() {
        assert!(LuaPool::new("x = 1").is_err());
        assert!(LuaPool::new("sandbox = 42").is_err());
        assert!(LuaPool::new("sandbox = { tostring = tostring }").is_ok());
    }
}
