use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(AccountId);
id_newtype!(PatientId);
id_newtype!(EmployeeId);
id_newtype!(DepartmentId);
id_newtype!(CategoryId);
id_newtype!(MedicineId);
id_newtype!(AppointmentId);
id_newtype!(ExamId);
id_newtype!(PrescriptionId);
id_newtype!(ShiftId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    Patient,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Patient => "patient",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "doctor" => Some(Role::Doctor),
            "nurse" => Some(Role::Nurse),
            "patient" => Some(Role::Patient),
            _ => None,
        }
    }

    /// Whether a collection-wide capability is granted to this role.
    ///
    /// Patient accounts hold no list-wide capabilities; their access to
    /// their own records is scoped per operation in the API layer.
    pub fn allows(self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::Admin => !matches!(capability, RecordClinical),
            Role::Doctor => matches!(
                capability,
                ViewPatients
                    | ViewAppointments
                    | ManageAppointments
                    | ViewClinical
                    | RecordClinical
            ),
            Role::Nurse => matches!(
                capability,
                ViewPatients
                    | ViewAppointments
                    | ManageAppointments
                    | ViewInventory
                    | ViewClinical
            ),
            Role::Patient => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ViewPatients,
    ManagePatients,
    ViewAppointments,
    ManageAppointments,
    ViewInventory,
    ManageInventory,
    ViewStaff,
    ManageStaff,
    ViewClinical,
    RecordClinical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
            Gender::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "female" => Some(Gender::Female),
            "male" => Some(Gender::Male),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    CheckedIn,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::CheckedIn => "checked_in",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "checked_in" => Some(AppointmentStatus::CheckedIn),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "no_show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::NoShow
        )
    }

    /// Allowed status moves: scheduled appointments can be checked in,
    /// cancelled, or marked as a no-show; checked-in appointments can be
    /// completed or cancelled; terminal statuses never move again.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        match self {
            AppointmentStatus::Scheduled => matches!(
                next,
                AppointmentStatus::CheckedIn
                    | AppointmentStatus::Cancelled
                    | AppointmentStatus::NoShow
            ),
            AppointmentStatus::CheckedIn => matches!(
                next,
                AppointmentStatus::Completed | AppointmentStatus::Cancelled
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_can_be_checked_in_or_closed() {
        assert!(AppointmentStatus::Scheduled.can_transition_to(AppointmentStatus::CheckedIn));
        assert!(AppointmentStatus::Scheduled.can_transition_to(AppointmentStatus::Cancelled));
        assert!(AppointmentStatus::Scheduled.can_transition_to(AppointmentStatus::NoShow));
        assert!(!AppointmentStatus::Scheduled.can_transition_to(AppointmentStatus::Completed));
    }

    #[test]
    fn terminal_statuses_never_move() {
        for status in [
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(AppointmentStatus::Scheduled));
            assert!(!status.can_transition_to(AppointmentStatus::CheckedIn));
        }
    }

    #[test]
    fn patient_role_holds_no_list_capabilities() {
        for capability in [
            Capability::ViewPatients,
            Capability::ViewAppointments,
            Capability::ViewInventory,
            Capability::ViewStaff,
            Capability::ViewClinical,
        ] {
            assert!(!Role::Patient.allows(capability));
        }
    }

    #[test]
    fn admin_manages_everything_but_clinical_records() {
        assert!(Role::Admin.allows(Capability::ManageStaff));
        assert!(Role::Admin.allows(Capability::ManageInventory));
        assert!(!Role::Admin.allows(Capability::RecordClinical));
        assert!(Role::Doctor.allows(Capability::RecordClinical));
        assert!(!Role::Nurse.allows(Capability::RecordClinical));
    }
}
