//! Crate-level test doubles and behaviour suites.

use std::cell::RefCell;
use std::collections::HashSet;

use multinet_delegate::{
    CniResult, Delegate, DelegateError, DelegateRunner, Interface, InvocationContext,
};


/// Delegate runner that records `"<COMMAND> <plugin> <ifname>"` lines and
/// fails for scripted plugin/command pairs.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    calls: RefCell<Vec<String>>,
    failures: RefCell<HashSet<(String, String)>>,
}

impl ScriptedRunner {
    pub(crate) fn fail(&self, plugin: &str, command: &str) {
        self.failures
            .borrow_mut()
            .insert((plugin.to_owned(), command.to_owned()));
    }

    pub(crate) fn recover(&self, plugin: &str) {
        self.failures
            .borrow_mut()
            .retain(|(failing, _)| failing != plugin);
    }

    pub(crate) fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    fn record(&self, command: &str, ifname: &str, delegate: &Delegate) -> Result<(), DelegateError> {
        let plugin = delegate.display_name();
        self.calls
            .borrow_mut()
            .push(format!("{command} {plugin} {ifname}"));
        if self
            .failures
            .borrow()
            .contains(&(plugin.to_owned(), command.to_owned()))
        {
            return Err(DelegateError::PluginFailed {
                plugin: plugin.to_owned(),
                code: 11,
                message: String::from("scripted failure"),
            });
        }
        Ok(())
    }
}

impl DelegateRunner for ScriptedRunner {
    fn add(
        &self,
        ifname: &str,
        delegate: &Delegate,
        context: &InvocationContext,
    ) -> Result<CniResult, DelegateError> {
        self.record("ADD", ifname, delegate)?;
        let mut result = CniResult::empty("0.4.0");
        result.interfaces.push(Interface {
            name: ifname.to_owned(),
            mac: String::from("02:42:ac:11:00:02"),
            sandbox: context.netns().unwrap_or_default().to_owned(),
        });
        Ok(result)
    }

    fn del(
        &self,
        ifname: &str,
        delegate: &Delegate,
        _context: &InvocationContext,
    ) -> Result<(), DelegateError> {
        self.record("DEL", ifname, delegate)
    }
}
