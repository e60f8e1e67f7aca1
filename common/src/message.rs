// Reminder message rendering
//
// Plain string substitution only; anything fancier belongs in the gateway
// service, not here.

use crate::models::Member;

/// Render the payment reminder sent to a member
///
/// Substitutes the member's first name, the due date formatted dd/MM/yyyy,
/// and the member number into the fixed template.
pub fn render_reminder(member: &Member) -> String {
    let due_date = member.due_date.format("%d/%m/%Y");

    format!(
        "🔔 *Recordatorio de Pago*\n\n\
         Hola *{}*,\n\n\
         Te recordamos que tu cuota vence el *{}*.\n\n\
         📋 Número de socio: *{}*\n\n\
         Por favor, realiza tu pago a tiempo para evitar cargos adicionales.\n\n\
         Gracias por tu preferencia. 🙏",
        member.first_name, due_date, member.member_number
    )
}
