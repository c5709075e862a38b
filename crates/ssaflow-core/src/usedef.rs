//! Use-def and member graph maintenance.
//!
//! The operand side of every edge lives in the user's [`InstKind`] payload;
//! the `users` set on the used value is its exact inverse. Every method here
//! updates both sides before returning, so no caller can observe one side
//! without the other.
//!
//! Object/member relations are keyed by the key *value* because keys may be
//! computed. Lookups by literal compare the key's constant when ids differ.

use crate::error::CoreError;
use crate::id::ValueId;
use crate::inst::{InstKind, MemberOf, UndefinedKind};
use crate::program::Program;
use crate::types::ConstValue;

impl Program {
    pub(crate) fn add_user(&mut self, value: ValueId, user: ValueId) -> Result<(), CoreError> {
        self.get_mut(value)?.users.insert(user);
        Ok(())
    }

    /// Drops `user` from `value.users` unless `user` still holds `value` in
    /// another operand slot.
    pub(crate) fn remove_user(&mut self, value: ValueId, user: ValueId) -> Result<(), CoreError> {
        let still_used = self
            .get(user)
            .map(|u| u.operands().contains(&value))
            .unwrap_or(false);
        if !still_used {
            self.get_mut(value)?.users.shift_remove(&user);
        }
        Ok(())
    }

    /// Rewrites every operand slot of `user` holding `old` to `new`. Returns
    /// the number of slots changed.
    pub fn replace_value(
        &mut self,
        user: ValueId,
        old: ValueId,
        new: ValueId,
    ) -> Result<usize, CoreError> {
        if old == new {
            return Ok(0);
        }
        self.get(new)?;
        let count = self.get_mut(user)?.kind.replace_operand(old, new);
        if count > 0 {
            self.remove_user(old, user)?;
            self.add_user(new, user)?;
        }
        Ok(count)
    }

    /// Redirects every user of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) -> Result<(), CoreError> {
        let users: Vec<ValueId> = self.get(old)?.users.iter().copied().collect();
        for user in users {
            if user != new {
                self.replace_value(user, old, new)?;
            }
        }
        Ok(())
    }

    /// Edits the payload of `id` in place and re-derives its operand edges.
    /// The edit must not change block targets; control edges are fixed when
    /// the instruction is emitted.
    pub fn update_operands<F>(&mut self, id: ValueId, edit: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut InstKind),
    {
        let (before, targets) = {
            let inst = self.get(id)?;
            (inst.operands(), inst.kind.block_targets())
        };
        let mut kind = self.get(id)?.kind.clone();
        edit(&mut kind);
        if kind.block_targets() != targets {
            return Err(CoreError::GraphInconsistency {
                reason: format!("operand edit of {} changed its block targets", id),
            });
        }
        let after = kind.operands();
        for op in &after {
            self.get(*op)?;
        }
        self.get_mut(id)?.kind = kind;
        for op in before.iter().filter(|op| !after.contains(op)) {
            self.remove_user(*op, id)?;
        }
        for op in after.iter() {
            self.add_user(*op, id)?;
        }
        Ok(())
    }

    /// Records that `mask` shadows `value` for variable resolution.
    pub fn add_mask(&mut self, value: ValueId, mask: ValueId) -> Result<(), CoreError> {
        if value != mask {
            self.get(mask)?;
            self.get_mut(value)?.masks.insert(mask);
        }
        Ok(())
    }

    /// Records that `value` is computed in terms of `referenced`.
    pub fn add_reference(&mut self, value: ValueId, referenced: ValueId) -> Result<(), CoreError> {
        self.get(referenced)?;
        self.get_mut(value)?.references.insert(referenced);
        Ok(())
    }

    pub fn bind_variable(&mut self, value: ValueId, name: &str) -> Result<(), CoreError> {
        self.get_mut(value)?.variables.insert(name.to_string());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Members
    // -----------------------------------------------------------------------

    /// Makes `member` the value of `object[key]`. A previous member under the
    /// same key loses its object relation. A constant key equal to an
    /// existing key reuses that key's slot.
    pub fn set_member(
        &mut self,
        object: ValueId,
        key: ValueId,
        member: ValueId,
    ) -> Result<(), CoreError> {
        self.get(member)?;
        let key = self.canonical_key(object, key)?;
        let previous = self.get_mut(object)?.members.insert(key, member);
        if let Some(prev) = previous.filter(|p| *p != member) {
            if let Ok(inst) = self.get_mut(prev) {
                if inst.member_of == Some(MemberOf { object, key }) {
                    inst.member_of = None;
                }
            }
        }
        self.get_mut(member)?.member_of = Some(MemberOf { object, key });
        Ok(())
    }

    /// Member stored under `key`: matched by id first, then by constant
    /// value so a literal key finds members created with another literal.
    pub fn get_member(&self, object: ValueId, key: ValueId) -> Option<ValueId> {
        let obj = self.lookup(object)?;
        if let Some(m) = obj.members.get(&key) {
            return Some(*m);
        }
        let wanted = self.lookup(key)?.const_value()?;
        self.find_member_by_const(object, wanted)
    }

    pub fn get_string_member(&self, object: ValueId, key: &str) -> Option<ValueId> {
        self.find_member_by_const(object, &ConstValue::from(key))
    }

    pub fn get_index_member(&self, object: ValueId, index: i64) -> Option<ValueId> {
        self.find_member_by_const(object, &ConstValue::Int(index))
    }

    fn canonical_key(&self, object: ValueId, key: ValueId) -> Result<ValueId, CoreError> {
        let obj = self.get(object)?;
        if obj.members.contains_key(&key) {
            return Ok(key);
        }
        let Some(wanted) = self.get(key)?.const_value() else {
            return Ok(key);
        };
        Ok(obj
            .members
            .keys()
            .copied()
            .find(|k| self.lookup(*k).and_then(|i| i.const_value()) == Some(wanted))
            .unwrap_or(key))
    }

    fn find_member_by_const(&self, object: ValueId, wanted: &ConstValue) -> Option<ValueId> {
        let obj = self.lookup(object)?;
        obj.members.iter().find_map(|(k, m)| {
            let key = self.lookup(*k)?.const_value()?;
            (key == wanted).then_some(*m)
        })
    }

    /// Removes `object[key]` and clears the member's object relation.
    pub fn delete_member(&mut self, object: ValueId, key: ValueId) -> Result<Option<ValueId>, CoreError> {
        let removed = self.get_mut(object)?.members.shift_remove(&key);
        if let Some(member) = removed {
            if let Ok(inst) = self.get_mut(member) {
                if inst.member_of == Some(MemberOf { object, key }) {
                    inst.member_of = None;
                }
            }
        }
        Ok(removed)
    }

    /// Snapshot of `(key, member)` pairs in insertion order.
    pub fn members(&self, object: ValueId) -> Vec<(ValueId, ValueId)> {
        self.lookup(object)
            .map(|o| o.members.iter().map(|(k, m)| (*k, *m)).collect())
            .unwrap_or_default()
    }

    /// Calls `f` for every member present when iteration starts. `f` may add
    /// or delete members of `object`.
    pub fn for_each_member<F>(&mut self, object: ValueId, mut f: F) -> Result<(), CoreError>
    where
        F: FnMut(&mut Program, ValueId, ValueId) -> Result<(), CoreError>,
    {
        for (key, member) in self.members(object) {
            f(self, key, member)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Removes `id` from the graph.
    ///
    /// Operand edges are dropped, remaining users are redirected to a fresh
    /// `Undefined` value, the node leaves its block and the member/key
    /// relations that mention it are cleared.
    pub fn self_delete(&mut self, id: ValueId) -> Result<(), CoreError> {
        let inst = self.get(id)?.clone();

        for op in inst.operands() {
            if let Ok(used) = self.get_mut(op) {
                used.users.shift_remove(&id);
            }
        }

        if !inst.users.is_empty() {
            let replacement = match inst.function {
                Some(func) => self.new_undefined(func, &inst.name, UndefinedKind::ValueInvalid)?,
                None => {
                    return Err(CoreError::GraphInconsistency {
                        reason: format!("{} has users but no owning function", id),
                    })
                }
            };
            for user in inst.users.iter().copied() {
                if user != id {
                    self.replace_value(user, id, replacement)?;
                }
            }
        }

        if let Some(block) = inst.block.filter(|b| ValueId::from(*b) != id) {
            if let Ok(b) = self.block_mut(block) {
                b.insts.retain(|i| *i != id);
                b.phis.retain(|i| *i != id);
            }
        }
        if let (Some(func), InstKind::Return { .. }) = (inst.function, &inst.kind) {
            if let Ok(f) = self.function_mut(func) {
                f.returns.retain(|r| *r != id);
            }
        }

        if let Some(MemberOf { object, key }) = inst.member_of {
            if let Ok(obj) = self.get_mut(object) {
                if obj.members.get(&key) == Some(&id) {
                    obj.members.shift_remove(&key);
                }
            }
        }
        for (key, member) in inst.members.iter() {
            if let Ok(m) = self.get_mut(*member) {
                if m.member_of == Some(MemberOf { object: id, key: *key }) {
                    m.member_of = None;
                }
            }
        }

        self.clear_slot(id);
        tracing::debug!(%id, opcode = ?inst.opcode(), "deleted instruction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::id::{BlockId, FunctionId, ValueId};
    use crate::inst::{BinaryOp, InstKind};
    use crate::program::Program;

    fn setup() -> (Program, FunctionId, BlockId) {
        let mut p = Program::new("t");
        let f = p.new_function("main", "main", None).unwrap();
        let b = p.function(f).unwrap().enter_block.unwrap();
        (p, f, b)
    }

    fn add(p: &mut Program, b: BlockId, x: ValueId, y: ValueId) -> ValueId {
        p.emit(
            b,
            InstKind::BinOp {
                op: BinaryOp::Add,
                x,
                y,
            },
        )
        .unwrap()
    }

    #[test]
    fn replace_value_moves_user_edge() {
        let (mut p, f, b) = setup();
        let one = p.new_const(Some(f), 1);
        let two = p.new_const(Some(f), 2);
        let three = p.new_const(Some(f), 3);
        let sum = add(&mut p, b, one, two);

        assert_eq!(p.replace_value(sum, one, three).unwrap(), 1);
        assert!(!p.get(one).unwrap().users().contains(&sum));
        assert!(p.get(three).unwrap().users().contains(&sum));
        p.verify_use_def().unwrap();
    }

    #[test]
    fn duplicate_operand_keeps_user_until_all_slots_move() {
        let (mut p, f, b) = setup();
        let one = p.new_const(Some(f), 1);
        let two = p.new_const(Some(f), 2);
        let double = add(&mut p, b, one, one);
        assert_eq!(p.replace_value(double, one, two).unwrap(), 2);
        assert!(!p.get(one).unwrap().has_users());
        p.verify_use_def().unwrap();
    }

    #[test]
    fn members_match_by_constant_key() {
        let (mut p, f, _) = setup();
        let obj = p.new_const(Some(f), 0);
        let key = p.new_const(Some(f), "user");
        let alice = p.new_const(Some(f), "alice");
        p.set_member(obj, key, alice).unwrap();

        let other_key = p.new_const(Some(f), "user");
        assert_eq!(p.get_member(obj, other_key), Some(alice));
        assert_eq!(p.get_string_member(obj, "user"), Some(alice));
        assert_eq!(p.get_string_member(obj, "name"), None);
        assert!(p.get(obj).unwrap().is_object());
        assert_eq!(p.get(alice).unwrap().object(), Some(obj));

        assert_eq!(p.delete_member(obj, key).unwrap(), Some(alice));
        assert!(!p.get(alice).unwrap().is_member());
        assert!(p.members(obj).is_empty());
    }

    #[test]
    fn index_members() {
        let (mut p, f, _) = setup();
        let list = p.new_const(Some(f), 0);
        let idx = p.new_const(Some(f), 1);
        let v = p.new_const(Some(f), "b");
        p.set_member(list, idx, v).unwrap();
        assert_eq!(p.get_index_member(list, 1), Some(v));
        assert_eq!(p.get_index_member(list, 0), None);
    }

    #[test]
    fn for_each_member_tolerates_mutation() {
        let (mut p, f, _) = setup();
        let obj = p.new_const(Some(f), 0);
        for i in 0..3 {
            let k = p.new_const(Some(f), i);
            let v = p.new_const(Some(f), i * 10);
            p.set_member(obj, k, v).unwrap();
        }
        let mut seen = 0;
        p.for_each_member(obj, |p, key, _| {
            seen += 1;
            p.delete_member(obj, key)?;
            let k = p.new_const(None, "extra");
            let v = p.new_const(None, 1);
            p.set_member(obj, k, v)
        })
        .unwrap();
        assert_eq!(seen, 3);
        // The three "extra" writes share one constant key.
        assert_eq!(p.members(obj).len(), 1);
        assert!(p.get_string_member(obj, "extra").is_some());
    }

    #[test]
    fn self_delete_detaches_everything() {
        let (mut p, f, b) = setup();
        let one = p.new_const(Some(f), 1);
        let two = p.new_const(Some(f), 2);
        let sum = add(&mut p, b, one, two);
        let user = add(&mut p, b, sum, one);

        let obj = p.new_const(Some(f), 0);
        let key = p.new_const(Some(f), "k");
        p.set_member(obj, key, sum).unwrap();

        p.self_delete(sum).unwrap();

        assert!(!p.contains(sum));
        assert!(!p.get(one).unwrap().users().contains(&sum));
        assert!(!p.get(two).unwrap().has_users());
        assert!(!p.block(b).unwrap().insts().contains(&sum));
        assert!(p.members(obj).is_empty());

        let replaced = p.get(user).unwrap().operands()[0];
        assert!(p.get(replaced).unwrap().is_undefined());
        p.verify_use_def().unwrap();
    }

    #[test]
    fn masks_and_variables() {
        let (mut p, f, _) = setup();
        let old = p.new_const(Some(f), 1);
        let new = p.new_const(Some(f), 2);
        p.add_mask(new, old).unwrap();
        p.bind_variable(new, "a").unwrap();
        assert!(p.get(new).unwrap().masks().contains(&old));
        assert!(p.get(new).unwrap().variables().contains("a"));
    }
}
